//! Best-effort foreground switch to a window whose title contains a substring.
//!
//! Used after a marquee window opens so the cabinet's inputs keep reaching
//! the game instead of the new, always-on-top banner. Failure is logged and
//! otherwise ignored.
//!
//! On Windows the visible top-level windows are enumerated with `EnumWindows`;
//! elsewhere `wmctrl -a` is tried.

/// Returns the first title that contains `needle`, case-insensitively.
pub fn find_title_match<'a, I>(titles: I, needle: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    titles
        .into_iter()
        .position(|title| title.to_lowercase().contains(&needle))
}

/// Brings the first visible window containing `title` to the foreground.
/// Returns true on success.
pub fn focus_window(title: &str) -> bool {
    if title.trim().is_empty() {
        return false;
    }
    let focused = imp::focus(title);
    if focused {
        tracing::debug!("Refocused window matching '{title}'");
    } else {
        tracing::warn!("Could not refocus a window matching '{title}'");
    }
    focused
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextW, IsWindowVisible, SetForegroundWindow,
    };

    unsafe extern "system" fn collect_window(hwnd: HWND, l_param: LPARAM) -> BOOL {
        let windows = &mut *(l_param.0 as *mut Vec<(HWND, String)>);
        if IsWindowVisible(hwnd).as_bool() {
            let mut buf = [0u16; 512];
            let len = GetWindowTextW(hwnd, &mut buf);
            if len > 0 {
                windows.push((hwnd, String::from_utf16_lossy(&buf[..len as usize])));
            }
        }
        BOOL(1)
    }

    pub fn focus(title: &str) -> bool {
        let mut windows: Vec<(HWND, String)> = Vec::new();
        let enumerated = unsafe {
            EnumWindows(
                Some(collect_window),
                LPARAM(&mut windows as *mut Vec<(HWND, String)> as isize),
            )
        };
        if let Err(e) = enumerated {
            tracing::warn!("EnumWindows failed: {e}");
            return false;
        }

        let Some(idx) = super::find_title_match(windows.iter().map(|(_, t)| t.as_str()), title)
        else {
            return false;
        };
        unsafe { SetForegroundWindow(windows[idx].0).as_bool() }
    }
}

// ── Other platforms ───────────────────────────────────────────────────────────

#[cfg(not(windows))]
mod imp {
    use std::process::{Command, Stdio};

    pub fn focus(title: &str) -> bool {
        Command::new("wmctrl")
            .args(["-a", title])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
