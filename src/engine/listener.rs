//! Boundary listener
//!
//! The engine calls a [`Listener`] at every suite, test and keyword start
//! and end. [`ProgressListener`] reacts to each one the same way: it drains
//! the captured output and sends it to the host as a progress chunk. It
//! never looks at what the boundary is about.

use serde::{Deserialize, Serialize};

use crate::capture::OutputInterceptor;
use crate::common::config::ListenerMode;
use crate::ipc::Channel;

/// Kind of boundary raised by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    StartSuite,
    EndSuite,
    StartTest,
    EndTest,
    StartKeyword,
    EndKeyword,
}

impl BoundaryKind {
    pub fn is_keyword(&self) -> bool {
        matches!(self, BoundaryKind::StartKeyword | BoundaryKind::EndKeyword)
    }
}

/// Boundary metadata as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    pub kind: BoundaryKind,
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Observer called by the engine during a run
///
/// The per-boundary methods default to [`Listener::on_boundary`].
pub trait Listener: Send {
    fn on_boundary(&mut self, boundary: &Boundary);

    fn start_suite(&mut self, boundary: &Boundary) {
        self.on_boundary(boundary)
    }

    fn end_suite(&mut self, boundary: &Boundary) {
        self.on_boundary(boundary)
    }

    fn start_test(&mut self, boundary: &Boundary) {
        self.on_boundary(boundary)
    }

    fn end_test(&mut self, boundary: &Boundary) {
        self.on_boundary(boundary)
    }

    fn start_keyword(&mut self, boundary: &Boundary) {
        self.on_boundary(boundary)
    }

    fn end_keyword(&mut self, boundary: &Boundary) {
        self.on_boundary(boundary)
    }

    /// A message the in-page library wants delivered to the host
    fn on_host_call(&mut self, _payload: serde_json::Map<String, serde_json::Value>) {}
}

/// Route a boundary to the matching listener method
pub fn dispatch(listener: &mut dyn Listener, boundary: &Boundary) {
    match boundary.kind {
        BoundaryKind::StartSuite => listener.start_suite(boundary),
        BoundaryKind::EndSuite => listener.end_suite(boundary),
        BoundaryKind::StartTest => listener.start_test(boundary),
        BoundaryKind::EndTest => listener.end_test(boundary),
        BoundaryKind::StartKeyword => listener.start_keyword(boundary),
        BoundaryKind::EndKeyword => listener.end_keyword(boundary),
    }
}

/// Flushes captured output to the host at every boundary
#[derive(Debug)]
pub struct ProgressListener {
    interceptor: OutputInterceptor,
    channel: Channel,
    mode: ListenerMode,
    boundaries: usize,
}

impl ProgressListener {
    pub fn new(interceptor: OutputInterceptor, channel: Channel, mode: ListenerMode) -> Self {
        Self {
            interceptor,
            channel,
            mode,
            boundaries: 0,
        }
    }

    /// Boundaries that triggered a flush so far
    pub fn boundaries(&self) -> usize {
        self.boundaries
    }

    fn accepts(&self, kind: BoundaryKind) -> bool {
        match self.mode {
            ListenerMode::Minimal => kind.is_keyword(),
            ListenerMode::Extended => true,
        }
    }

    fn flush(&self) {
        self.channel.progress(self.interceptor.drain());
    }
}

impl Listener for ProgressListener {
    fn on_boundary(&mut self, boundary: &Boundary) {
        if !self.accepts(boundary.kind) {
            return;
        }
        self.boundaries += 1;
        tracing::trace!(kind = ?boundary.kind, name = %boundary.name, "Boundary");
        self.flush();
    }

    fn on_host_call(&mut self, payload: serde_json::Map<String, serde_json::Value>) {
        // Output printed before the call reaches the host first
        self.flush();
        self.channel.host_call(payload);
    }
}
