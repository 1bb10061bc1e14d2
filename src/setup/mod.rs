//! Test engine resolution
//!
//! Makes sure the engine is importable before the first session, installing
//! it on demand. Resolution happens once per process: later sessions reuse
//! the handle without probing again.

pub mod installer;

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::common::config::EngineConfig;
use crate::common::{Error, Result};
use crate::engine::EngineHandle;
use crate::ipc::Channel;

pub use installer::{EnginePackage, PipPackage, ProbeStatus};

/// Resolves the engine at most once per process
pub struct EngineResolver {
    package: Arc<dyn EnginePackage>,
    state: OnceCell<EngineHandle>,
}

impl std::fmt::Debug for EngineResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineResolver")
            .field("resolved", &self.state.get())
            .finish()
    }
}

impl EngineResolver {
    pub fn new(package: Arc<dyn EnginePackage>) -> Self {
        Self {
            package,
            state: OnceCell::new(),
        }
    }

    /// Resolver backed by pip and the configured interpreter
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Arc::new(PipPackage::from_config(config)))
    }

    /// Handle from an earlier successful resolution
    pub fn resolved(&self) -> Option<&EngineHandle> {
        self.state.get()
    }

    /// Make the engine importable, installing it if needed
    ///
    /// Concurrent callers wait for the first one. A failed resolution is not
    /// cached, so a later session tries again.
    pub async fn ensure_engine(&self, channel: &Channel) -> Result<EngineHandle> {
        self.state
            .get_or_try_init(|| self.resolve(channel))
            .await
            .cloned()
    }

    async fn resolve(&self, channel: &Channel) -> Result<EngineHandle> {
        let reason = match self.package.probe().await? {
            ProbeStatus::Installed(handle) => {
                tracing::info!(version = %handle.version, "Using installed engine");
                return Ok(handle);
            }
            ProbeStatus::NotInstalled { reason } => reason,
        };
        tracing::info!(%reason, "Engine not importable, installing");

        channel.diagnostic("Install Robot Framework Stack Trace\n");
        channel.diagnostic("Install Robot Framework");
        self.package.install().await?;

        match self.package.probe().await? {
            ProbeStatus::Installed(handle) => {
                channel.diagnostic(format!(" = version {}\n", handle.version));
                tracing::info!(version = %handle.version, "Engine installed");
                Ok(handle)
            }
            ProbeStatus::NotInstalled { reason } => Err(Error::Install(format!(
                "engine still not importable after install: {}",
                reason
            ))),
        }
    }
}
