//! robot-bridge - Robot Framework execution bridge
//!
//! This library runs Robot Framework suites for a host, streaming the
//! engine's console output at every suite, test and keyword boundary and
//! delivering the rendered report when the run completes.

pub mod bridge;
pub mod capture;
pub mod cli;
pub mod commands;
pub mod common;
pub mod engine;
pub mod ipc;
pub mod runner;
pub mod session;
pub mod setup;
pub mod stage;

// Re-export commonly used types for tests
pub use bridge::Bridge;
pub use common::{Error, Result};
pub use ipc::{Envelope, SessionRequest};
