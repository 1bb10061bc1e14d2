//! Configuration, log and working area locations

use std::io;
use std::path::PathBuf;

/// Name used for project directories
const APP_NAME: &str = "robot-bridge";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/robot-bridge/`
/// - macOS: `~/Library/Application Support/robot-bridge/`
/// - Windows: `%APPDATA%\robot-bridge\`
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

/// Parent directory for session working areas
///
/// Falls back to the system temp dir when nothing is configured.
pub fn workdir_base(configured: Option<&PathBuf>) -> io::Result<PathBuf> {
    let base = configured
        .cloned()
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME));
    if !base.exists() {
        std::fs::create_dir_all(&base)?;
    }
    Ok(base)
}
