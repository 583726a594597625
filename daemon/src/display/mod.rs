//! Multi-monitor marquee image display.
//!
//! Each `show` spawns a separate OS process (this binary's `show-image`
//! subcommand, tagged `marquee_image`) that owns one borderless, always-on-top
//! window covering the target monitor. The process runs until it is killed by
//! identifier. Callers must kill the previous display before showing a new one;
//! inside the daemon that ordering is enforced by the [`actor`].
pub mod actor;
pub mod render;
pub mod window;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::launcher::{self, ChildHandle, ProcessTag};

pub const SHOW_IMAGE_SUBCOMMAND: &str = "show-image";

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no monitors detected")]
    NoMonitor,
    #[error("window error: {0}")]
    Window(String),
}

/// Everything a display process needs, passed on its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRequest {
    pub image_path: PathBuf,
    pub background_color: String,
    pub monitor_index: i32,
}

impl DisplayRequest {
    pub fn new(image_path: impl Into<PathBuf>, background_color: &str, monitor_index: i32) -> Self {
        Self {
            image_path: image_path.into(),
            background_color: background_color.to_string(),
            monitor_index,
        }
    }

    /// A request for `image_path` using the configured color and monitor.
    pub fn from_config(image_path: impl Into<PathBuf>, config: &Config) -> Self {
        Self::new(
            image_path,
            &config.display.background_color,
            config.display.monitor_index,
        )
    }

    /// Arguments for the `show-image` subcommand.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            SHOW_IMAGE_SUBCOMMAND.to_string(),
            self.image_path.to_string_lossy().into_owned(),
            format!("--color={}", self.background_color),
            // `=` form so that negative indices are not mistaken for flags.
            format!("--monitor={}", self.monitor_index),
        ]
    }
}

/// Spawns a tagged display process for `request` using `viewer` (normally
/// this binary). A missing image is logged and skipped.
pub fn show(viewer: &Path, request: &DisplayRequest) -> ChildHandle {
    if !request.image_path.exists() {
        let reason = format!("marquee image not found: {}", request.image_path.display());
        tracing::warn!("{reason}");
        return ChildHandle::Failed(reason);
    }
    tracing::info!(
        monitor = request.monitor_index,
        "Showing {} on marquee",
        request.image_path.display()
    );
    launcher::launch(viewer, Some(&ProcessTag::marquee()), &request.to_args())
}

/// The executable implementing `show-image`: the configured viewer, else this binary.
pub fn viewer_executable(config: &Config) -> PathBuf {
    if let Some(viewer) = &config.display.viewer_executable {
        return PathBuf::from(viewer);
    }
    std::env::current_exe().unwrap_or_else(|e| {
        tracing::warn!("Cannot resolve own executable ({e}); relying on PATH");
        PathBuf::from(env!("CARGO_PKG_NAME"))
    })
}

/// Picks the monitor for `requested` among `count` monitors.
///
/// Returns the index to use and whether the request had to fall back to
/// monitor 0. `None` only when there are no monitors at all.
pub fn select_monitor(requested: i32, count: usize) -> Option<(usize, bool)> {
    if count == 0 {
        return None;
    }
    match usize::try_from(requested) {
        Ok(idx) if idx < count => Some((idx, false)),
        _ => Some((0, true)),
    }
}

/// Parses a background color into softbuffer's `0x00RRGGBB`.
///
/// Accepts a few common names, `#RGB` and `#RRGGBB`. Returns `None` for
/// anything else.
pub fn parse_color(spec: &str) -> Option<u32> {
    let s = spec.trim().to_ascii_lowercase();
    let named = match s.as_str() {
        "black" => Some(0x000000),
        "white" => Some(0xFFFFFF),
        "red" => Some(0xFF0000),
        "green" => Some(0x008000),
        "lime" => Some(0x00FF00),
        "blue" => Some(0x0000FF),
        "gray" | "grey" => Some(0x808080),
        "yellow" => Some(0xFFFF00),
        "cyan" => Some(0x00FFFF),
        "magenta" => Some(0xFF00FF),
        "orange" => Some(0xFFA500),
        "purple" => Some(0x800080),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let hex = s.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => u32::from_str_radix(hex, 16).ok(),
        3 => {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            u32::from_str_radix(&expanded, 16).ok()
        }
        _ => None,
    }
}

/// [`parse_color`] with a logged fallback to black.
pub fn color_or_black(spec: &str) -> u32 {
    parse_color(spec).unwrap_or_else(|| {
        tracing::warn!("Unrecognised background color '{spec}', using black");
        0x000000
    })
}
