//! Outer session boundary
//!
//! [`Bridge::run`] is the only entry point hosts use. It allows one active
//! session at a time and turns every outcome into envelopes: a final report
//! on success, exactly one error envelope on failure. Errors never escape
//! to the host as a crash.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::capture::OutputInterceptor;
use crate::common::config::Config;
use crate::common::Error;
use crate::engine::robot::RobotEngine;
use crate::engine::Engine;
use crate::ipc::{Channel, SessionRequest};
use crate::runner::Runner;
use crate::session::{Session, SessionState};
use crate::setup::EngineResolver;

/// Runs sessions on behalf of a host
pub struct Bridge {
    runner: Mutex<Runner>,
    channel: Channel,
}

impl Bridge {
    pub fn new(
        config: Config,
        resolver: Arc<EngineResolver>,
        engine: Arc<dyn Engine>,
        interceptor: OutputInterceptor,
        channel: Channel,
    ) -> Self {
        Self {
            runner: Mutex::new(Runner::new(
                config,
                resolver,
                engine,
                interceptor,
                channel.clone(),
            )),
            channel,
        }
    }

    /// Bridge driving Robot Framework through the configured interpreter
    pub fn robot(config: Config, channel: Channel) -> Self {
        let resolver = Arc::new(EngineResolver::from_config(&config.engine));
        Self::new(
            config,
            resolver,
            Arc::new(RobotEngine::new()),
            OutputInterceptor::new(),
            channel,
        )
    }

    /// Run one session and report its outcome to the host
    ///
    /// Returns the session's terminal state.
    pub async fn run(&self, request: &SessionRequest) -> SessionState {
        let Ok(mut runner) = self.runner.try_lock() else {
            let err = Error::SessionAlreadyActive;
            tracing::warn!("Rejected session: {}", err);
            self.channel.error(&err);
            return SessionState::Failed;
        };

        let mut session = match Session::create(&runner.config().session) {
            Ok(session) => session,
            Err(e) => {
                self.fail(None, &e);
                return SessionState::Failed;
            }
        };

        let state = match runner.run_session(&mut session, request).await {
            Ok(report) => {
                tracing::info!(
                    session = session.id(),
                    report_bytes = report.html.len(),
                    output_bytes = report.std_output.len(),
                    "Session succeeded"
                );
                self.channel.finished(report.html, report.std_output);
                session.state()
            }
            Err(e) => {
                self.fail(Some(session.id()), &e);
                session.state()
            }
        };

        session.close();
        state
    }

    fn fail(&self, session: Option<u64>, err: &Error) {
        if err.is_pre_invocation() {
            tracing::error!(?session, "Session aborted before the engine ran: {}", err);
        } else {
            tracing::error!(?session, "Session failed: {}", err);
        }
        self.channel.error(err);
    }
}
