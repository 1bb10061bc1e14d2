//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::config_path;
use super::Result;
use crate::engine::ConsoleColors;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Test engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Output capture settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Defaults applied when a request leaves an option unset
    #[serde(default)]
    pub defaults: Defaults,

    /// Session working area settings
    #[serde(default)]
    pub session: SessionConfig,
}

/// Which engine boundaries trigger a progress flush
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListenerMode {
    /// Keyword start/end only
    Minimal,
    /// Suite, test and keyword start/end
    #[default]
    Extended,
}

/// Test engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Python interpreter; searched on PATH when unset
    #[serde(default)]
    pub python: Option<PathBuf>,

    /// Packages installed when the engine cannot be imported
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// Engine-native listeners registered next to the bridge listener
    #[serde(default = "default_native_listeners")]
    pub native_listeners: Vec<String>,

    /// Report artifact read from the working area after the run
    #[serde(default = "default_report_artifact")]
    pub report_artifact: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            python: None,
            packages: default_packages(),
            native_listeners: default_native_listeners(),
            report_artifact: default_report_artifact(),
        }
    }
}

fn default_packages() -> Vec<String> {
    vec!["robotframework-stacktrace".to_string()]
}

fn default_native_listeners() -> Vec<String> {
    vec!["RobotStackTracer".to_string()]
}

fn default_report_artifact() -> String {
    "log.html".to_string()
}

/// Output capture configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CaptureConfig {
    /// Merge the engine's stderr into the captured output
    #[serde(default)]
    pub stderr: bool,

    /// Boundary set the progress listener reacts to
    #[serde(default)]
    pub listener: ListenerMode,
}

/// Default run options
#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Unknown modes are rejected when the file is loaded
    #[serde(default = "default_consolecolors")]
    pub consolecolors: ConsoleColors,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            consolecolors: default_consolecolors(),
        }
    }
}

fn default_loglevel() -> String {
    "TRACE:INFO".to_string()
}

fn default_consolecolors() -> ConsoleColors {
    ConsoleColors::Ansi
}

/// Session working area configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Parent directory for working areas (system temp dir when unset)
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Keep the working area after the session for inspection
    #[serde(default)]
    pub keep_working_area: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
