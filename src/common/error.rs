//! Error types for the bridge
//!
//! Every failure that can end a session maps onto one of the bridge-level
//! kinds (install, staging, execution, missing report, channel). The outer
//! boundary turns them into an error envelope for the host.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    // === Bridge Errors ===
    #[error("Failed to install the test engine: {0}")]
    Install(String),

    #[error("Failed to stage '{file}': {reason}")]
    Staging { file: String, reason: String },

    #[error("Test engine execution failed: {0}")]
    Execution(String),

    #[error("Engine finished but produced no report at '{0}'")]
    ReportMissing(String),

    #[error("Channel send failed: {0}")]
    Channel(String),

    // === Session Errors ===
    #[error("A test session is already running. Wait for it to finish before starting another")]
    SessionAlreadyActive,

    #[error("Output capture is already active for another session")]
    CaptureAlreadyActive,

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a staging error for a target file
    pub fn staging(file: &str, reason: impl ToString) -> Self {
        Self::Staging {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error ends the session before the engine was invoked
    pub fn is_pre_invocation(&self) -> bool {
        matches!(
            self,
            Error::Install(_) | Error::Staging { .. } | Error::SessionAlreadyActive
        )
    }
}

/// Serializable error carried in the host's error envelope
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ErrorEnvelope {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::Install(_) => "INSTALL_ERROR",
            Error::Staging { .. } => "STAGING_ERROR",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::ReportMissing(_) => "REPORT_MISSING",
            Error::Channel(_) => "CHANNEL_ERROR",
            Error::SessionAlreadyActive | Error::CaptureAlreadyActive => "SESSION_ACTIVE",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}
