//! Session execution
//!
//! [`Runner::run_session`] takes one request from a staged suite to a final
//! report: resolve the engine, stage the artifacts, run the engine with
//! output captured, then read back the report.

use std::sync::Arc;

use crate::capture::OutputInterceptor;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::engine::{Engine, Invocation, ProgressListener};
use crate::ipc::{Channel, SessionRequest};
use crate::session::{Session, SessionState};
use crate::setup::EngineResolver;
use crate::stage::{self, Stager};

/// Diagnostic sent right before the suite starts
pub const RUNNING_NOTICE: &str = "\n-- Running Robot Framework --\n";

/// Outcome of a successful session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalReport {
    /// Rendered report artifact
    pub html: String,
    /// Full console text of the run
    pub std_output: String,
    pub finished: bool,
}

/// Drives sessions with one engine, resolver and channel
pub struct Runner {
    config: Config,
    resolver: Arc<EngineResolver>,
    engine: Arc<dyn Engine>,
    stager: Stager,
    interceptor: OutputInterceptor,
    channel: Channel,
}

impl Runner {
    pub fn new(
        config: Config,
        resolver: Arc<EngineResolver>,
        engine: Arc<dyn Engine>,
        interceptor: OutputInterceptor,
        channel: Channel,
    ) -> Self {
        Self {
            config,
            resolver,
            engine,
            stager: Stager::new(),
            interceptor,
            channel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one session to its final report
    ///
    /// Failing tests do not make this an error; only a session the engine
    /// could not complete does. The session's state is updated either way.
    pub async fn run_session(
        &mut self,
        session: &mut Session,
        request: &SessionRequest,
    ) -> Result<FinalReport> {
        session.transition(SessionState::Running);
        let result = self.execute(session, request).await;
        session.transition(if result.is_ok() {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        });
        result
    }

    async fn execute(
        &mut self,
        session: &mut Session,
        request: &SessionRequest,
    ) -> Result<FinalReport> {
        let handle = self.resolver.ensure_engine(&self.channel).await?;

        let mut files = stage::files_for(request);
        files.extend(self.engine.helper_files());
        let staged = self.stager.stage(session.area(), &files)?;
        let suite = staged
            .suite()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| Error::Internal("no suite script was staged".to_string()))?;
        session.set_staged(staged);

        // Only announced once nothing can abort the session before invocation
        self.channel.diagnostic(RUNNING_NOTICE);

        let options = request.options.clone().with_defaults(&self.config.defaults);
        let invocation = Invocation {
            handle: &handle,
            suite: &suite,
            working_area: session.area(),
            options: &options,
            native_listeners: &self.config.engine.native_listeners,
            capture_stderr: self.config.capture.stderr,
        };

        let mut listener = ProgressListener::new(
            self.interceptor.clone(),
            self.channel.clone(),
            self.config.capture.listener,
        );

        let std_output = {
            let guard = self.interceptor.begin_capture()?;
            tracing::info!(
                session = session.id(),
                engine = %handle.version,
                suite = %suite.display(),
                "Running suite"
            );
            let exit = match self
                .engine
                .run(&invocation, &mut listener, &self.interceptor.sink())
                .await
            {
                Ok(exit) => exit,
                Err(e) => {
                    // Output since the last boundary still reaches the host
                    self.channel.progress(guard.drain());
                    return Err(e);
                }
            };
            tracing::info!(
                session = session.id(),
                code = exit.code,
                failed = ?exit.failed_tests(),
                boundaries = listener.boundaries(),
                "Suite finished"
            );
            guard.transcript()
        };

        let report = session.area().join(&self.config.engine.report_artifact);
        let html = std::fs::read_to_string(&report).map_err(|e| {
            tracing::debug!("Failed to read {}: {}", report.display(), e);
            Error::ReportMissing(report.display().to_string())
        })?;

        Ok(FinalReport {
            html,
            std_output,
            finished: true,
        })
    }
}
