//! Robot Framework engine
//!
//! Runs `python -m robot` in the working area. A small listener module is
//! staged next to the suite; it prints boundary messages on the engine's
//! stdout (see [`super::stream`]), which is read here and fed to the
//! bridge's [`Listener`] in order.

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::capture::OutputSink;
use crate::common::{Error, Result};
use crate::stage::{Role, StagedFile};

use super::listener::{dispatch, Listener};
use super::stream::{Frame, FrameDecoder, HelperMessage};
use super::{Engine, EngineExit, Invocation};

/// File name of the staged listener helper
pub const LISTENER_FILE: &str = "BridgeListener.py";

/// Listener helper, API version 2
///
/// The in-page library can `from BridgeListener import post_message` to send
/// arbitrary JSON to the host.
pub const LISTENER_SOURCE: &str = r#"import json
import sys

MARKER = "\x1f"


def _emit(message):
    stream = sys.__stdout__
    stream.write(MARKER + json.dumps(message) + "\n")
    stream.flush()


def post_message(payload):
    _emit({"type": "host_call", "payload": payload})


class BridgeListener:
    ROBOT_LISTENER_API_VERSION = 2

    def _boundary(self, kind, name, attrs):
        args = [str(a) for a in attrs.get("args", [])]
        _emit({"type": "boundary", "kind": kind, "name": name, "args": args})

    def start_suite(self, name, attrs):
        self._boundary("start_suite", name, attrs)

    def end_suite(self, name, attrs):
        self._boundary("end_suite", name, attrs)

    def start_test(self, name, attrs):
        self._boundary("start_test", name, attrs)

    def end_test(self, name, attrs):
        self._boundary("end_test", name, attrs)

    def start_keyword(self, name, attrs):
        self._boundary("start_keyword", name, attrs)

    def end_keyword(self, name, attrs):
        self._boundary("end_keyword", name, attrs)
"#;

/// Exit code for a run stopped by the user or a signal
const EXIT_INTERRUPTED: i32 = 253;
/// Exit code for an unexpected internal engine error
const EXIT_INTERNAL: i32 = 255;

/// Robot Framework driven through a Python interpreter
#[derive(Debug, Default, Clone)]
pub struct RobotEngine;

impl RobotEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Build the engine command line (after `python -m robot`)
pub fn robot_args(inv: &Invocation<'_>) -> Vec<OsString> {
    fn push(args: &mut Vec<OsString>, flag: &str, value: &str) {
        args.push(flag.into());
        args.push(value.into());
    }

    let mut args = Vec::new();
    let opts = inv.options;
    if let Some(colors) = opts.consolecolors {
        push(&mut args, "--consolecolors", colors.as_str());
    }
    if let Some(level) = &opts.loglevel {
        push(&mut args, "--loglevel", level);
    }
    for tag in &opts.include {
        push(&mut args, "--include", tag);
    }
    for tag in &opts.exclude {
        push(&mut args, "--exclude", tag);
    }
    for tag in &opts.skip {
        push(&mut args, "--skip", tag);
    }
    for pattern in &opts.removekeywords {
        push(&mut args, "--removekeywords", pattern);
    }
    for pattern in &opts.flattenkeywords {
        push(&mut args, "--flattenkeywords", pattern);
    }
    for (name, value) in &opts.variables {
        push(&mut args, "--variable", &format!("{}:{}", name, value));
    }
    for listener in inv.native_listeners {
        push(&mut args, "--listener", listener);
    }

    args.push("--listener".into());
    args.push(inv.working_area.join(LISTENER_FILE).into_os_string());
    args.push("--outputdir".into());
    args.push(inv.working_area.as_os_str().to_owned());
    args.push("--pythonpath".into());
    args.push(inv.working_area.as_os_str().to_owned());
    args.push(inv.suite.as_os_str().to_owned());
    args
}

/// Map the engine's exit status onto the bridge's view of the run
fn interpret_exit(code: Option<i32>) -> Result<EngineExit> {
    match code {
        None => Err(Error::Execution(
            "engine process was terminated by a signal".to_string(),
        )),
        Some(EXIT_INTERRUPTED) => Err(Error::Execution("engine run was interrupted".to_string())),
        Some(EXIT_INTERNAL) => Err(Error::Execution(
            "engine reported an unexpected internal error".to_string(),
        )),
        Some(code) => Ok(EngineExit { code }),
    }
}

/// Copy a stream into the sink until EOF
async fn pump<R: AsyncRead + Unpin>(mut reader: R, sink: OutputSink) -> std::io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        sink.write_bytes(&buf[..n])?;
    }
}

/// Decode engine stdout until EOF, feeding text to the sink and messages
/// to the listener
async fn forward<R: AsyncRead + Unpin>(
    mut stdout: R,
    listener: &mut dyn Listener,
    sink: &OutputSink,
) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = stdout
            .read(&mut buf)
            .await
            .map_err(|e| Error::Execution(format!("failed to read engine output: {}", e)))?;
        if n == 0 {
            break;
        }
        for frame in decoder.push(&buf[..n]) {
            match frame {
                Frame::Text(text) => sink.write_bytes(&text)?,
                Frame::Message(HelperMessage::Boundary(boundary)) => dispatch(listener, &boundary),
                Frame::Message(HelperMessage::HostCall { payload }) => {
                    listener.on_host_call(payload)
                }
            }
        }
    }
    if let Some(Frame::Text(text)) = decoder.finish() {
        sink.write_bytes(&text)?;
    }
    Ok(())
}

/// Wait for the stderr pump, or stop it when the run is abandoned
///
/// An abandoned pump must not outlive the session's capture.
async fn join_pump(task: Option<JoinHandle<std::io::Result<()>>>, abandon: bool) {
    let Some(task) = task else {
        return;
    };
    if abandon {
        task.abort();
    }
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Lost part of engine stderr: {}", e),
        Err(e) if e.is_cancelled() => tracing::debug!("Engine stderr reader stopped"),
        Err(e) => tracing::warn!("Engine stderr reader failed: {}", e),
    }
}

#[async_trait]
impl Engine for RobotEngine {
    fn helper_files(&self) -> Vec<StagedFile> {
        vec![StagedFile::new(Role::Listener, LISTENER_SOURCE)]
    }

    async fn run(
        &self,
        inv: &Invocation<'_>,
        listener: &mut dyn Listener,
        sink: &OutputSink,
    ) -> Result<EngineExit> {
        let args = robot_args(inv);
        tracing::debug!(python = %inv.handle.python.display(), ?args, "Starting engine");

        let mut child = Command::new(&inv.handle.python)
            .arg("-m")
            .arg("robot")
            .args(&args)
            .current_dir(inv.working_area)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if inv.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Execution(format!(
                    "failed to start {}: {}",
                    inv.handle.python.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Execution("failed to get engine stdout".to_string()))?;

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(pump(stderr, sink.clone())));

        if let Err(e) = forward(stdout, listener, sink).await {
            join_pump(stderr_task, true).await;
            return Err(e);
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                join_pump(stderr_task, true).await;
                return Err(Error::Execution(format!("failed to wait for engine: {}", e)));
            }
        };
        join_pump(stderr_task, false).await;

        tracing::debug!(code = ?status.code(), "Engine exited");
        interpret_exit(status.code())
    }
}
