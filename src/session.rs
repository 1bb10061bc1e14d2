//! Test session state
//!
//! A [`Session`] is one execution attempt. It owns the working area the
//! artifacts are staged into; the area is removed when the session is
//! dropped unless it is configured to be kept.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;

use crate::common::config::SessionConfig;
use crate::common::{paths, Result};
use crate::stage::StagedSuite;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

/// One test-execution attempt
#[derive(Debug)]
pub struct Session {
    id: u64,
    area: TempDir,
    keep: bool,
    state: SessionState,
    staged: Option<StagedSuite>,
}

impl Session {
    /// Create a session with a fresh working area
    pub fn create(config: &SessionConfig) -> Result<Self> {
        let base = paths::workdir_base(config.workdir.as_ref())?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let area = tempfile::Builder::new()
            .prefix(&format!("session-{}-", id))
            .tempdir_in(&base)?;

        tracing::debug!(session = id, area = %area.path().display(), "Session created");
        Ok(Self {
            id,
            area,
            keep: config.keep_working_area,
            state: SessionState::Pending,
            staged: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Working area the artifacts are staged into
    pub fn area(&self) -> &Path {
        self.area.path()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn staged(&self) -> Option<&StagedSuite> {
        self.staged.as_ref()
    }

    pub(crate) fn set_staged(&mut self, staged: StagedSuite) {
        self.staged = Some(staged);
    }

    pub(crate) fn transition(&mut self, state: SessionState) {
        tracing::debug!(session = self.id, from = ?self.state, to = ?state, "Session state");
        self.state = state;
    }

    /// Tear the session down, returning the working area if it was kept
    pub fn close(self) -> Option<PathBuf> {
        if self.keep {
            #[allow(deprecated)]
            let kept = self.area.into_path();
            tracing::info!(session = self.id, area = %kept.display(), "Working area kept");
            Some(kept)
        } else {
            // Dropping the TempDir removes the area
            None
        }
    }
}
