/// Return-to-menu hotkey via a low-level Windows keyboard hook (`WH_KEYBOARD_LL`).
///
/// The hook lives on its own OS thread with a Windows message pump, so the key
/// is seen even while a full-screen emulator holds focus. Pressing it posts
/// [`DaemonEvent::ResetRequested`] to the daemon loop.
///
/// On non-Windows platforms the public API compiles but is a no-op at runtime.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;

use crate::event::DaemonEvent;

/// Currently watched virtual-key code (0 = disabled).
static HOOK_VK: AtomicU32 = AtomicU32::new(0);

/// Where the hook callback posts reset requests. Set once by [`start`].
static HOOK_TX: OnceLock<mpsc::Sender<DaemonEvent>> = OnceLock::new();

/// Converts a key name (`"F12"`, `"R"`, `"0"`) to a Windows virtual-key code.
///
/// Supports `F1`–`F12`, `A`–`Z` and `0`–`9`, case-insensitively.
pub fn parse_vk(name: &str) -> Option<u32> {
    let upper = name.trim().to_ascii_uppercase();
    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
        // F1 = 0x70 … F12 = 0x7B
        return (1..=12).contains(&n).then_some(0x6F + n);
    }
    let mut chars = upper.chars();
    match (chars.next(), chars.next()) {
        // VK codes for letters and digits equal their ASCII values.
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c as u32),
        _ => None,
    }
}

// ── Public handle ─────────────────────────────────────────────────────────────

pub struct HotkeyHandle {
    #[cfg(windows)]
    thread: std::thread::JoinHandle<()>,
    /// Thread ID of the message-pump thread, used to post `WM_QUIT`.
    #[cfg(windows)]
    thread_id: u32,
}

impl HotkeyHandle {
    /// Switches to `key_name`. An unrecognised name disables the hotkey.
    pub fn update_key(&self, key_name: &str) {
        let vk = parse_vk(key_name).unwrap_or(0);
        if vk == 0 && !key_name.trim().is_empty() {
            tracing::warn!("Unrecognised reset hotkey '{key_name}', hotkey disabled");
        }
        HOOK_VK.store(vk, Ordering::Relaxed);
    }

    /// Signals the hook thread to stop and blocks until it exits.
    pub fn stop(self) {
        #[cfg(windows)]
        {
            imp::post_quit(self.thread_id);
            let _ = self.thread.join();
        }
    }
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Installs the keyboard hook on a dedicated thread.
///
/// Presses are forwarded with `try_send`; if the daemon's queue is full the
/// press is dropped.
pub fn start(initial_key: &str, tx: mpsc::Sender<DaemonEvent>) -> anyhow::Result<HotkeyHandle> {
    // Ignored if called more than once (e.g. in test binaries).
    let _ = HOOK_TX.set(tx);

    #[cfg(windows)]
    {
        use anyhow::Context;

        let (id_tx, id_rx) = std::sync::mpsc::sync_channel::<u32>(1);
        let thread = std::thread::Builder::new()
            .name("hotkey-pump".into())
            .spawn(move || imp::run_message_pump(id_tx))
            .context("Failed to spawn hotkey thread")?;
        let thread_id = id_rx.recv().context("Hotkey thread exited before starting")?;
        let handle = HotkeyHandle { thread, thread_id };
        handle.update_key(initial_key);
        Ok(handle)
    }

    #[cfg(not(windows))]
    {
        let handle = HotkeyHandle {};
        handle.update_key(initial_key);
        Ok(handle)
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc as std_mpsc;

    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
        UnhookWindowsHookEx, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT,
    };

    use super::{HOOK_TX, HOOK_VK};
    use crate::event::DaemonEvent;

    unsafe extern "system" fn keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        if n_code >= 0 && w_param.0 as u32 == WM_KEYDOWN {
            let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            let target = HOOK_VK.load(Ordering::Relaxed);
            if target != 0 && kb.vkCode == target {
                if let Some(tx) = HOOK_TX.get() {
                    let _ = tx.try_send(DaemonEvent::ResetRequested);
                }
            }
        }
        CallNextHookEx(None, n_code, w_param, l_param)
    }

    /// Installs `WH_KEYBOARD_LL` and pumps messages until `WM_QUIT`.
    /// The thread ID is sent first so the owner can post `WM_QUIT` later.
    pub fn run_message_pump(id_tx: std_mpsc::SyncSender<u32>) {
        unsafe {
            let _ = id_tx.send(GetCurrentThreadId());
            drop(id_tx);

            let hook = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE::default(), 0) {
                Ok(hook) => hook,
                Err(e) => {
                    tracing::error!("SetWindowsHookExW failed, reset hotkey unavailable: {e}");
                    return;
                }
            };

            let mut msg = MSG::default();
            // GetMessageW: >0 = message, 0 = WM_QUIT, <0 = error.
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
            tracing::debug!("Hotkey hook thread exited");
        }
    }

    pub fn post_quit(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_keys_are_contiguous_from_0x70() {
        for n in 1u32..=12 {
            let name = format!("F{n}");
            assert_eq!(parse_vk(&name), Some(0x6F + n), "Wrong VK for {name}");
        }
        assert_eq!(parse_vk("f12"), Some(0x7B));
    }

    #[test]
    fn letters_and_digits_match_ascii() {
        for c in (b'A'..=b'Z').chain(b'0'..=b'9') {
            let name = (c as char).to_string();
            assert_eq!(parse_vk(&name), Some(c as u32), "Failed for {name}");
        }
        assert_eq!(parse_vk("r"), parse_vk("R"));
    }

    #[test]
    fn unsupported_names_return_none() {
        for name in ["", "F0", "F13", "Escape", "AB", "!", " ", "F1x"] {
            assert_eq!(parse_vk(name), None, "{name:?}");
        }
    }

    #[test]
    fn default_reset_key_is_recognised() {
        assert!(parse_vk(crate::config::DEFAULT_RESET_HOTKEY).is_some());
    }

    /// Only one test calls `start()` so the binary never installs two hooks.
    #[test]
    fn start_update_stop_lifecycle() {
        let (tx, _rx) = tokio::sync::mpsc::channel::<DaemonEvent>(8);
        let handle = start("F12", tx).unwrap();
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0x7B);

        handle.update_key("R");
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 'R' as u32);

        handle.update_key("NotAKey");
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0);

        handle.stop();
    }
}
