//! Canonical file paths for cabinet data files.
//!
//! All files live under one application directory:
//!   - config.toml  Written by the installer, read by the daemon.
//!   - status.toml  Written by the daemon, read by anything that wants to know its state.
//!   - logs/        Rolling daemon and display-process logs.
//!
//! On Windows the directory is %APPDATA%\ArcadeCabinet\, elsewhere
//! $XDG_CONFIG_HOME/arcade-cabinet/ (or ~/.config/arcade-cabinet/).
use std::path::PathBuf;

#[cfg(windows)]
const APP_DIR_NAME: &str = "ArcadeCabinet";
#[cfg(not(windows))]
const APP_DIR_NAME: &str = "arcade-cabinet";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const LOG_DIR_NAME: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "cabinet.log";

/// Returns the cabinet application data directory.
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    base_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}

#[cfg(windows)]
fn base_dir() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(PathBuf::from)
}

#[cfg(not(windows))]
fn base_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

/// Returns the directory holding rolling log files.
pub fn log_dir() -> PathBuf {
    app_data_dir().join(LOG_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        let dir = app_data_dir();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn status_file_path_has_correct_name() {
        let path = status_file_path();
        assert_eq!(path.file_name().unwrap(), STATUS_FILE_NAME);
    }

    #[test]
    fn config_status_and_logs_share_same_parent_dir() {
        let config = config_file_path();
        let status = status_file_path();
        let logs = log_dir();
        assert_eq!(config.parent(), status.parent());
        assert_eq!(config.parent(), logs.parent());
    }
}
