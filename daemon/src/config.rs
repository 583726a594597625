use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::event::DaemonEvent;

pub const DEFAULT_BACKGROUND_COLOR: &str = "black";
pub const DEFAULT_MONITOR_INDEX: i32 = 1;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_REFOCUS_DELAY_MS: u64 = 500;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2_000;
pub const DEFAULT_RESET_HOTKEY: &str = "F12";
/// Poll intervals below this are raised to it so a typo cannot spin a core.
pub const MIN_POLL_INTERVAL_MS: u64 = 20;

/// Root configuration structure. Deserialized from the cabinet `config.toml`,
/// which is generated by the installer and only ever read here.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub kill_list: KillListConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub dynamic_marquee: DynamicMarqueeConfig,
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub hotkey: HotkeyConfig,
}

/// Processes swept by the reset sequence and `kill-all`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct KillListConfig {
    /// Executable names (e.g. "ITGmania.exe"). Matching ignores case and the
    /// `.exe` suffix.
    #[serde(default)]
    pub processes: Vec<String>,
}

/// Marquee display defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Image shown on the marquee after a reset.
    #[serde(default)]
    pub default_image: Option<String>,
    #[serde(default = "default_background_color")]
    pub background_color: String,
    /// Zero-based monitor index. Out-of-range values fall back to monitor 0.
    #[serde(default = "default_monitor_index")]
    pub monitor_index: i32,
    /// Executable that implements `show-image`. Defaults to the running binary.
    #[serde(default)]
    pub viewer_executable: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_image: None,
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            monitor_index: DEFAULT_MONITOR_INDEX,
            viewer_executable: None,
        }
    }
}

/// How the marquee log file is watched.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Native change notifications, polling only if they are unavailable.
    #[default]
    Auto,
    /// Fixed-interval modification-time polling.
    Poll,
}

/// Song-selection driven marquee.
#[derive(Debug, Deserialize, Clone)]
pub struct DynamicMarqueeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Log file rewritten by the game on every selection event.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Installation directory that relative banner paths are resolved against.
    #[serde(default)]
    pub base_path: Option<String>,
    /// Image shown for events that carry no banner. Falls back to
    /// `display.default_image`.
    #[serde(default)]
    pub banner_path: Option<String>,
    /// Substring of the game window title to refocus after a banner change.
    #[serde(default)]
    pub focus_window_title: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_refocus_delay")]
    pub refocus_delay_ms: u64,
    #[serde(default)]
    pub watch_mode: WatchMode,
}

impl Default for DynamicMarqueeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_file: None,
            base_path: None,
            banner_path: None,
            focus_window_title: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            refocus_delay_ms: DEFAULT_REFOCUS_DELAY_MS,
            watch_mode: WatchMode::Auto,
        }
    }
}

impl DynamicMarqueeConfig {
    /// Returns the poll interval, raised to [`MIN_POLL_INTERVAL_MS`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn refocus_delay(&self) -> Duration {
        Duration::from_millis(self.refocus_delay_ms)
    }
}

/// External lighting controller executables.
#[derive(Debug, Deserialize, Clone)]
pub struct LightingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub reset_executable: Option<String>,
    #[serde(default)]
    pub mame_lights_executable: Option<String>,
    /// How long the reset executable may run before it is killed.
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
    /// Lighting test tools swept after the reset executable is killed.
    #[serde(default)]
    pub test_processes: Vec<String>,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reset_executable: None,
            mame_lights_executable: None,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            test_processes: Vec::new(),
        }
    }
}

impl LightingConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// The menu application relaunched at the end of every reset.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FrontendConfig {
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    /// Virtual-key name of the return-to-menu hotkey (e.g. "F12"). Empty disables it.
    #[serde(default = "default_reset_hotkey")]
    pub reset: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            reset: DEFAULT_RESET_HOTKEY.to_string(),
        }
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Like [`load_or_default`], but logs a parse failure and falls back to defaults.
/// Entry points use this so that a broken config never stops a reset.
pub fn load_or_warn(path: &Path) -> Config {
    load_or_default(path).unwrap_or_else(|e| {
        tracing::error!("Config error (using defaults): {e:#}");
        Config::default()
    })
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("Failed to create config watcher: {e}");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        tracing::warn!("Failed to watch config directory {}: {e}", watch_dir.display());
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p.ends_with(path.as_path()) || p == &path);
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_background_color() -> String {
    DEFAULT_BACKGROUND_COLOR.to_string()
}

fn default_monitor_index() -> i32 {
    DEFAULT_MONITOR_INDEX
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_refocus_delay() -> u64 {
    DEFAULT_REFOCUS_DELAY_MS
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

fn default_reset_hotkey() -> String {
    DEFAULT_RESET_HOTKEY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_values() {
        let c = Config::default();
        assert!(c.kill_list.processes.is_empty());
        assert_eq!(c.display.background_color, DEFAULT_BACKGROUND_COLOR);
        assert_eq!(c.display.monitor_index, DEFAULT_MONITOR_INDEX);
        assert!(c.display.default_image.is_none());
        assert!(!c.dynamic_marquee.enabled);
        assert_eq!(c.dynamic_marquee.watch_mode, WatchMode::Auto);
        assert!(!c.lighting.enabled);
        assert_eq!(c.lighting.grace_period_ms, DEFAULT_GRACE_PERIOD_MS);
        assert_eq!(c.hotkey.reset, DEFAULT_RESET_HOTKEY);
    }

    #[test]
    fn poll_interval_is_raised_to_minimum() {
        let cfg = DynamicMarqueeConfig {
            poll_interval_ms: 1,
            ..Default::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));

        let cfg = DynamicMarqueeConfig {
            poll_interval_ms: 750,
            ..Default::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(750));
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert!(config.kill_list.processes.is_empty());
        assert!(!config.dynamic_marquee.enabled);
    }

    #[test]
    fn load_or_default_parses_full_cabinet_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r##"
[kill_list]
processes = ["ITGmania.exe", "mame.exe"]

[display]
default_image = "C:/Cabinet/marquee/default.png"
background_color = "#101010"
monitor_index = 2

[dynamic_marquee]
enabled = true
log_file = "C:\\Games\\ITGmania\\Logs\\marquee.log"
base_path = "C:\\Games\\ITGmania"
focus_window_title = "ITGmania"
watch_mode = "poll"

[lighting]
enabled = true
reset_executable = "C:/Cabinet/lights/reset.exe"
test_processes = ["LEDBlinkyInputTester.exe"]

[frontend]
executable = "C:/Cabinet/frontend/frontend.exe"
args = ["--fullscreen"]

[hotkey]
reset = "F10"
"##,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.kill_list.processes, vec!["ITGmania.exe", "mame.exe"]);
        assert_eq!(config.display.default_image.as_deref(), Some("C:/Cabinet/marquee/default.png"));
        assert_eq!(config.display.background_color, "#101010");
        assert_eq!(config.display.monitor_index, 2);
        assert!(config.dynamic_marquee.enabled);
        assert_eq!(config.dynamic_marquee.base_path.as_deref(), Some("C:\\Games\\ITGmania"));
        assert_eq!(config.dynamic_marquee.watch_mode, WatchMode::Poll);
        assert_eq!(config.dynamic_marquee.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.lighting.enabled);
        assert_eq!(config.lighting.test_processes, vec!["LEDBlinkyInputTester.exe"]);
        assert_eq!(config.frontend.args, vec!["--fullscreen"]);
        assert_eq!(config.hotkey.reset, "F10");
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display]\nmonitor_index = 0\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.display.monitor_index, 0);
        assert_eq!(config.display.background_color, DEFAULT_BACKGROUND_COLOR);
        assert_eq!(config.hotkey.reset, DEFAULT_RESET_HOTKEY);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_warn_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[display\nbroken").unwrap();
        let config = load_or_warn(&path);
        assert_eq!(config.display.monitor_index, DEFAULT_MONITOR_INDEX);
    }

    #[test]
    fn unknown_watch_mode_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dynamic_marquee]\nwatch_mode = \"inotify\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
