//! One-way channel to the host
//!
//! Sends never wait for the host. Envelopes go into an unbounded queue that
//! a writer task (see [`super::transport::spawn_writer`]) drains. A failed
//! send is logged and dropped: reporting it through the same channel could
//! only fail again.

use tokio::sync::mpsc;

use crate::common::{Error, Result};

use super::protocol::Envelope;

/// Sending half of the host channel
#[derive(Debug, Clone)]
pub struct Channel {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Channel {
    /// Create a channel and the receiver the writer task consumes
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an envelope for the host
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| Error::Channel("host channel closed".to_string()))
    }

    /// Best-effort send; failures are logged, never escalated
    pub fn post(&self, envelope: Envelope) {
        if let Err(e) = self.send(envelope) {
            tracing::warn!("Dropping host message: {}", e);
        }
    }

    /// Send captured engine output; empty chunks are elided
    pub fn progress(&self, text: String) {
        if text.is_empty() {
            return;
        }
        tracing::trace!(bytes = text.len(), "Progress chunk");
        self.post(Envelope::output(text));
    }

    /// Send a human-readable notice from the bridge itself
    pub fn diagnostic(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(notice = %text.trim(), "Diagnostic");
        self.post(Envelope::output(text));
    }

    /// Forward a message from the in-page library
    pub fn host_call(&self, payload: serde_json::Map<String, serde_json::Value>) {
        self.post(Envelope::HostCall(payload));
    }

    /// Send the terminal envelope of a successful session
    pub fn finished(&self, html: String, std_output: String) {
        self.post(Envelope::finished(html, std_output));
    }

    /// Send the error envelope of a failed session
    pub fn error(&self, error: &Error) {
        self.post(Envelope::error(error));
    }

    /// Whether the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
