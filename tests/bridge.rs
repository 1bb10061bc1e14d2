//! End-to-end tests for the session boundary
//!
//! These tests drive [`Bridge::run`] with a scripted engine and a fake
//! engine package, then check the exact envelope sequence the host would
//! receive.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;

use robot_bridge::capture::{OutputInterceptor, OutputSink};
use robot_bridge::cli::{serve_lines, serve_socket};
use robot_bridge::common::config::Config;
use robot_bridge::engine::listener::dispatch;
use robot_bridge::engine::{
    Boundary, BoundaryKind, Engine, EngineExit, EngineHandle, Invocation, Listener,
};
use robot_bridge::ipc::{transport, Channel};
use robot_bridge::runner::RUNNING_NOTICE;
use robot_bridge::session::SessionState;
use robot_bridge::setup::{EnginePackage, EngineResolver, ProbeStatus};
use robot_bridge::stage::{Role, StagedFile};
use robot_bridge::{Bridge, Envelope, Error, Result, SessionRequest};

/// One thing the scripted engine does
#[derive(Debug, Clone)]
enum Step {
    Print(&'static str),
    Boundary(BoundaryKind),
    Sleep(u64),
    Fail(&'static str),
}

/// Engine that replays a script instead of running Robot Framework
#[derive(Clone)]
struct ScriptedEngine {
    steps: Vec<Step>,
    exit_code: i32,
    write_report: bool,
    helpers: Vec<StagedFile>,
    runs: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            exit_code: 0,
            write_report: true,
            helpers: Vec::new(),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn helper_files(&self) -> Vec<StagedFile> {
        self.helpers.clone()
    }

    async fn run(
        &self,
        inv: &Invocation<'_>,
        listener: &mut dyn Listener,
        sink: &OutputSink,
    ) -> Result<EngineExit> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        assert!(inv.suite.exists(), "suite must be staged before invocation");

        for step in &self.steps {
            match step {
                Step::Print(text) => sink.write_bytes(text.as_bytes())?,
                Step::Boundary(kind) => dispatch(
                    listener,
                    &Boundary {
                        kind: *kind,
                        name: "Passing Test".to_string(),
                        args: Vec::new(),
                    },
                ),
                Step::Sleep(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                Step::Fail(reason) => return Err(Error::Execution(reason.to_string())),
            }
        }

        if self.write_report {
            std::fs::write(
                inv.working_area.join("log.html"),
                "<html><body>Passing Test PASS</body></html>",
            )?;
        }
        Ok(EngineExit {
            code: self.exit_code,
        })
    }
}

/// Engine package that is missing until installed
#[derive(Default)]
struct FakePackage {
    installed: AtomicBool,
    installs: AtomicUsize,
}

impl FakePackage {
    fn installed() -> Self {
        let package = Self::default();
        package.installed.store(true, Ordering::SeqCst);
        package
    }
}

#[async_trait]
impl EnginePackage for FakePackage {
    async fn probe(&self) -> Result<ProbeStatus> {
        if self.installed.load(Ordering::SeqCst) {
            Ok(ProbeStatus::Installed(EngineHandle {
                python: PathBuf::from("python3"),
                version: "7.0.1".to_string(),
            }))
        } else {
            Ok(ProbeStatus::NotInstalled {
                reason: "No module named 'robot'".to_string(),
            })
        }
    }

    async fn install(&self) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Bridge wired to in-memory fakes
struct TestContext {
    bridge: Bridge,
    rx: UnboundedReceiver<Envelope>,
    interceptor: OutputInterceptor,
    package: Arc<FakePackage>,
    engine: ScriptedEngine,
    /// Parent of the session working areas
    workdir: tempfile::TempDir,
}

/// Bridge over the fakes, with session areas under `workdir`
fn fake_bridge(
    engine: &ScriptedEngine,
    package: Arc<FakePackage>,
    interceptor: OutputInterceptor,
    workdir: &std::path::Path,
    channel: Channel,
) -> Bridge {
    let mut config = Config::default();
    config.session.workdir = Some(workdir.to_path_buf());
    Bridge::new(
        config,
        Arc::new(EngineResolver::new(package)),
        Arc::new(engine.clone()),
        interceptor,
        channel,
    )
}

fn quiet_interceptor() -> OutputInterceptor {
    OutputInterceptor::with_original(Box::new(std::io::sink()))
}

impl TestContext {
    fn new(engine: ScriptedEngine, package: FakePackage) -> Self {
        let workdir = tempfile::tempdir().unwrap();
        let package = Arc::new(package);
        let interceptor = quiet_interceptor();
        let (channel, rx) = Channel::new();

        let bridge = fake_bridge(
            &engine,
            package.clone(),
            interceptor.clone(),
            workdir.path(),
            channel,
        );

        Self {
            bridge,
            rx,
            interceptor,
            package,
            engine,
            workdir,
        }
    }

    /// Everything sent to the host so far
    fn envelopes(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            out.push(envelope);
        }
        out
    }

    /// Working areas left behind
    fn leftover_areas(&self) -> usize {
        std::fs::read_dir(self.workdir.path()).unwrap().count()
    }
}

fn request() -> SessionRequest {
    SessionRequest {
        robot_file: "*** Test Cases ***\nPassing Test\n    Log    hello\n".to_string(),
        resource_file: "*** Keywords ***\n".to_string(),
        library_py: "def my_keyword():\n    pass\n".to_string(),
        in_page_library: String::new(),
        ..Default::default()
    }
}

fn passing_suite() -> Vec<Step> {
    vec![
        Step::Print("==============\nTest\n==============\n"),
        Step::Boundary(BoundaryKind::StartSuite),
        Step::Boundary(BoundaryKind::StartTest),
        Step::Boundary(BoundaryKind::StartKeyword),
        Step::Print("Passing Test"),
        Step::Boundary(BoundaryKind::EndKeyword),
        Step::Print("                 | PASS |\n"),
        Step::Boundary(BoundaryKind::EndTest),
        Step::Boundary(BoundaryKind::EndSuite),
        Step::Print("1 test, 1 passed, 0 failed\n"),
    ]
}

fn finals(envelopes: &[Envelope]) -> Vec<&Envelope> {
    envelopes.iter().filter(|e| e.is_finished()).collect()
}

fn errors(envelopes: &[Envelope]) -> Vec<&Envelope> {
    envelopes
        .iter()
        .filter(|e| matches!(e, Envelope::Error { .. }))
        .collect()
}

#[tokio::test]
async fn test_passing_suite_streams_progress_then_final() {
    let mut ctx = TestContext::new(ScriptedEngine::new(passing_suite()), FakePackage::installed());

    let state = ctx.bridge.run(&request()).await;
    assert_eq!(state, SessionState::Succeeded);

    let envelopes = ctx.envelopes();
    assert_eq!(envelopes[0], Envelope::output(RUNNING_NOTICE));
    assert_eq!(
        &envelopes[1..4],
        &[
            Envelope::output("==============\nTest\n==============\n"),
            Envelope::output("Passing Test"),
            Envelope::output("                 | PASS |\n"),
        ]
    );

    // Output after the last boundary only shows up in the final transcript
    assert_eq!(envelopes.len(), 5);
    match &envelopes[4] {
        Envelope::Final {
            html,
            std_output,
            finished,
        } => {
            assert!(finished);
            assert!(html.contains("Passing Test PASS"));
            assert_eq!(
                std_output,
                "==============\nTest\n==============\nPassing Test                 | PASS |\n\
                 1 test, 1 passed, 0 failed\n"
            );
        }
        other => panic!("Expected final envelope, got {:?}", other),
    }

    assert!(!ctx.interceptor.is_capturing());
    assert_eq!(ctx.leftover_areas(), 0);
}

#[tokio::test]
async fn test_missing_engine_is_installed_first() {
    let mut ctx = TestContext::new(ScriptedEngine::new(passing_suite()), FakePackage::default());

    assert_eq!(ctx.bridge.run(&request()).await, SessionState::Succeeded);

    let envelopes = ctx.envelopes();
    assert_eq!(
        &envelopes[..4],
        &[
            Envelope::output("Install Robot Framework Stack Trace\n"),
            Envelope::output("Install Robot Framework"),
            Envelope::output(" = version 7.0.1\n"),
            Envelope::output(RUNNING_NOTICE),
        ]
    );
    assert_eq!(finals(&envelopes).len(), 1);
    assert_eq!(ctx.package.installs.load(Ordering::SeqCst), 1);

    // A second session reuses the resolved engine without diagnostics
    assert_eq!(ctx.bridge.run(&request()).await, SessionState::Succeeded);
    let envelopes = ctx.envelopes();
    assert_eq!(envelopes[0], Envelope::output(RUNNING_NOTICE));
    assert_eq!(ctx.package.installs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_staging_failure_never_invokes_engine() {
    let mut engine = ScriptedEngine::new(passing_suite());
    engine.helpers = vec![StagedFile::new(Role::Listener, "x").with_target("../escape.py")];
    let mut ctx = TestContext::new(engine, FakePackage::installed());

    assert_eq!(ctx.bridge.run(&request()).await, SessionState::Failed);

    let envelopes = ctx.envelopes();
    assert_eq!(envelopes.len(), 1);
    match &envelopes[0] {
        Envelope::Error { error, std_output } => {
            assert_eq!(error.code, "STAGING_ERROR");
            assert!(std_output.contains("../escape.py"));
        }
        other => panic!("Expected error envelope, got {:?}", other),
    }
    assert_eq!(ctx.engine.runs(), 0);
    assert!(!ctx.workdir.path().join("escape.py").exists());
}

#[tokio::test]
async fn test_engine_failure_keeps_streamed_progress() {
    let engine = ScriptedEngine::new(vec![
        Step::Print("Suite\n"),
        Step::Boundary(BoundaryKind::StartTest),
        Step::Print("half a line"),
        Step::Boundary(BoundaryKind::StartKeyword),
        Step::Print("never flushed"),
        Step::Fail("engine crashed"),
    ]);
    let mut ctx = TestContext::new(engine, FakePackage::installed());

    assert_eq!(ctx.bridge.run(&request()).await, SessionState::Failed);

    let envelopes = ctx.envelopes();
    assert_eq!(
        &envelopes[..3],
        &[
            Envelope::output(RUNNING_NOTICE),
            Envelope::output("Suite\n"),
            Envelope::output("half a line"),
        ]
    );
    // Output after the last boundary is flushed before the error
    assert_eq!(envelopes[3], Envelope::output("never flushed"));
    assert_eq!(envelopes.len(), 5);
    match &envelopes[4] {
        Envelope::Error { error, .. } => {
            assert_eq!(error.code, "EXECUTION_ERROR");
            assert!(error.message.contains("engine crashed"));
        }
        other => panic!("Expected error envelope, got {:?}", other),
    }
    assert!(finals(&envelopes).is_empty());

    // Capture ended with the session; later output reaches the original destination
    assert!(!ctx.interceptor.is_capturing());
    ctx.interceptor.sink().write_bytes(b"after").unwrap();
    assert_eq!(ctx.interceptor.drain(), "");
}

#[tokio::test]
async fn test_failing_tests_still_finish() {
    let mut engine = ScriptedEngine::new(vec![
        Step::Boundary(BoundaryKind::StartTest),
        Step::Print("Failing Test                 | FAIL |\n"),
        Step::Boundary(BoundaryKind::EndTest),
    ]);
    engine.exit_code = 1;
    let mut ctx = TestContext::new(engine, FakePackage::installed());

    assert_eq!(ctx.bridge.run(&request()).await, SessionState::Succeeded);

    let envelopes = ctx.envelopes();
    assert_eq!(finals(&envelopes).len(), 1);
    assert!(errors(&envelopes).is_empty());
}

#[tokio::test]
async fn test_missing_report_is_an_error() {
    let mut engine = ScriptedEngine::new(passing_suite());
    engine.write_report = false;
    let mut ctx = TestContext::new(engine, FakePackage::installed());

    assert_eq!(ctx.bridge.run(&request()).await, SessionState::Failed);

    let envelopes = ctx.envelopes();
    assert!(finals(&envelopes).is_empty());
    let errs = errors(&envelopes);
    assert_eq!(errs.len(), 1);
    match errs[0] {
        Envelope::Error { error, .. } => assert_eq!(error.code, "REPORT_MISSING"),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_second_concurrent_session_is_rejected() {
    let engine = ScriptedEngine::new(vec![
        Step::Print("slow\n"),
        Step::Sleep(50),
        Step::Boundary(BoundaryKind::EndTest),
    ]);
    let mut ctx = TestContext::new(engine, FakePackage::installed());

    let req = request();
    let (first, second) = tokio::join!(ctx.bridge.run(&req), ctx.bridge.run(&req));
    assert_eq!(first, SessionState::Succeeded);
    assert_eq!(second, SessionState::Failed);
    assert_eq!(ctx.engine.runs(), 1);

    let envelopes = ctx.envelopes();
    assert_eq!(finals(&envelopes).len(), 1);
    let errs = errors(&envelopes);
    assert_eq!(errs.len(), 1);
    match errs[0] {
        Envelope::Error { error, .. } => assert_eq!(error.code, "SESSION_ACTIVE"),
        _ => unreachable!(),
    }
}

fn error_codes(envelopes: &[Envelope]) -> Vec<&str> {
    envelopes
        .iter()
        .filter_map(|e| match e {
            Envelope::Error { error, .. } => Some(error.code.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_serve_lines_rejects_malformed_request_and_keeps_serving() {
    let workdir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new(passing_suite());
    let package = Arc::new(FakePackage::installed());

    let (mut host_in, bridge_in) = tokio::io::duplex(64 * 1024);
    let (bridge_out, mut host_out) = tokio::io::duplex(1024 * 1024);

    let valid = serde_json::to_string(&request()).unwrap();
    host_in
        .write_all(format!("\n{{bad json\n{}\n", valid).as_bytes())
        .await
        .unwrap();
    drop(host_in);

    let served = serve_lines(bridge_in, bridge_out, |channel| {
        fake_bridge(&engine, package.clone(), quiet_interceptor(), workdir.path(), channel)
    })
    .await;
    assert!(served.is_ok());

    let mut raw = String::new();
    host_out.read_to_string(&mut raw).await.unwrap();
    let envelopes: Vec<Envelope> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // Blank line skipped, bad line answered with one error, then a full session
    assert_eq!(error_codes(&envelopes), vec!["INTERNAL_ERROR"]);
    assert!(matches!(envelopes[0], Envelope::Error { .. }));
    assert_eq!(finals(&envelopes).len(), 1);
    assert!(envelopes.last().unwrap().is_finished());
    assert_eq!(engine.runs(), 1);
}

#[tokio::test]
async fn test_serve_socket_answers_each_framed_request() {
    let workdir = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new(passing_suite());
    let package = Arc::new(FakePackage::installed());

    let (mut host_in, bridge_in) = tokio::io::duplex(64 * 1024);
    let (bridge_out, mut host_out) = tokio::io::duplex(1024 * 1024);

    transport::send_message(&mut host_in, b"not a request")
        .await
        .unwrap();
    let valid = serde_json::to_vec(&request()).unwrap();
    transport::send_message(&mut host_in, &valid).await.unwrap();
    drop(host_in);

    let served = serve_socket(bridge_in, bridge_out, |channel| {
        fake_bridge(&engine, package.clone(), quiet_interceptor(), workdir.path(), channel)
    })
    .await;
    assert!(served.is_ok());

    let mut envelopes = Vec::new();
    while let Ok(data) = transport::recv_message(&mut host_out).await {
        envelopes.push(serde_json::from_slice::<Envelope>(&data).unwrap());
    }
    assert_eq!(error_codes(&envelopes), vec!["INTERNAL_ERROR"]);
    assert_eq!(finals(&envelopes).len(), 1);
    assert_eq!(engine.runs(), 1);
}
