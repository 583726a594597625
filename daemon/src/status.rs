use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Running, dynamic marquee disabled.
    Idle,
    /// The marquee monitor is tailing the game's log file.
    Watching,
    /// A return-to-menu sequence is in progress.
    Resetting,
}

/// Runtime status written by the daemon next to its config file.
/// External tools read this file to show what the cabinet is doing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: DaemonState,
    /// Type of the last marquee event acted on (e.g. "Chosen").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<String>,
    /// Image currently requested on the marquee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_banner: Option<String>,
    /// RFC 3339 timestamp of the last completed reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reset_timestamp: Option<String>,
    /// Human-readable message if the daemon hit a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            last_event: None,
            current_banner: None,
            last_reset_timestamp: None,
            error: None,
        }
    }

    /// State to return to once a reset is over.
    pub fn resting_state(marquee_enabled: bool) -> DaemonState {
        if marquee_enabled {
            DaemonState::Watching
        } else {
            DaemonState::Idle
        }
    }

    /// Records a finished reset at the current local time.
    pub fn mark_reset(&mut self) {
        self.last_reset_timestamp = Some(chrono::Local::now().to_rfc3339());
    }
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// A status write failure is logged and never stops the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create status directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::warn!("Failed to write status file: {e}");
            }
        }
        Err(e) => tracing::warn!("Failed to serialize status: {e}"),
    }
}
