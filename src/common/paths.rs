//! Configuration, log and workspace paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/profile-harness/`, `~/.local/share/profile-harness/`
//! - macOS: `~/Library/Application Support/profile-harness/`

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Name used for configuration and data directories
const APP_NAME: &str = "profile-harness";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Default parent directory for per-scenario workspaces
pub fn default_workspace() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Build a unique log path for one session component
///
/// The path is `<log_dir>/<component>/<unix-secs>-<pid>`. It is only a name;
/// the component that owns it creates the directory (possibly on a remote host).
pub fn make_log_path(component: &str) -> PathBuf {
    let base = log_dir().unwrap_or_else(|| std::env::temp_dir().join(APP_NAME).join("logs"));
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    base.join(component)
        .join(format!("{}-{}", stamp, std::process::id()))
}
