//! Host message types
//!
//! Inbound: the host posts one [`SessionRequest`] per run. Outbound: every
//! event is an [`Envelope`], a flat JSON object whose fields say what it is.
//! `finished: true` is the only completion signal the host gets.

use serde::{Deserialize, Serialize};

use crate::common::error::ErrorEnvelope;
use crate::engine::RunOptions;

/// A request to run one suite
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Suite script
    pub robot_file: String,
    /// Shared resource definitions
    #[serde(default)]
    pub resource_file: String,
    /// Custom keyword library source
    #[serde(default)]
    pub library_py: String,
    /// In-page helper library source
    #[serde(default, rename = "inPageLibrary")]
    pub in_page_library: String,
    /// Engine configuration bundle
    #[serde(default)]
    pub options: RunOptions,
}

/// Outbound message to the host
///
/// Variant order matters for deserialization: the most specific shapes
/// come first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Final report; `finished` is always true
    Final {
        html: String,
        std_output: String,
        finished: bool,
    },
    /// Fatal session error
    Error {
        std_output: String,
        error: ErrorEnvelope,
    },
    /// Progress chunk or diagnostic notice
    Output { std_output: String },
    /// Message posted by the in-page library, forwarded verbatim
    HostCall(serde_json::Map<String, serde_json::Value>),
}

impl Envelope {
    /// Create a progress or diagnostic envelope
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output {
            std_output: text.into(),
        }
    }

    /// Create the terminal envelope of a successful session
    pub fn finished(html: String, std_output: String) -> Self {
        Self::Final {
            html,
            std_output,
            finished: true,
        }
    }

    /// Create an error envelope
    pub fn error(error: &crate::common::Error) -> Self {
        Self::Error {
            std_output: format!("\n{}\n", error),
            error: ErrorEnvelope::from(error),
        }
    }

    /// Whether this envelope ends the session successfully
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Final { finished: true, .. })
    }

    /// Text the host appends to its console, if any
    pub fn std_output(&self) -> Option<&str> {
        match self {
            Self::Final { std_output, .. }
            | Self::Error { std_output, .. }
            | Self::Output { std_output } => Some(std_output),
            Self::HostCall(_) => None,
        }
    }
}
