//! CLI command handling
//!
//! Builds the bridge for each command, wires its channel to the chosen
//! transport and reports the outcome.

use std::collections::BTreeMap;
use std::path::Path;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;

use crate::bridge::Bridge;
use crate::commands::{Commands, RunArgs};
use crate::common::config::Config;
use crate::common::{logging, paths, Error, Result};
use crate::engine::RunOptions;
use crate::ipc::transport::{self, Framing};
use crate::ipc::{Channel, SessionRequest};
use crate::session::SessionState;
use crate::setup::EngineResolver;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Serve { .. } => {
            // Should never happen - serve mode is handled in main
            unreachable!("Serve command should be handled in main")
        }

        Commands::Run {
            suite,
            resource,
            library,
            in_page_library,
            options,
            socket,
        } => {
            let request = SessionRequest {
                robot_file: read_source(&suite)?,
                resource_file: read_optional(resource.as_deref())?,
                library_py: read_optional(library.as_deref())?,
                in_page_library: read_optional(in_page_library.as_deref())?,
                options: run_options(options)?,
            };

            let (channel, rx) = Channel::new();
            let writer = match socket {
                Some(name) => {
                    let stream = transport::connect(&name).await?;
                    transport::spawn_writer(rx, stream, Framing::LengthPrefixed)
                }
                None => transport::spawn_writer(rx, tokio::io::stdout(), Framing::Lines),
            };

            let bridge = Bridge::robot(config, channel);
            let state = bridge.run(&request).await;
            drop(bridge);
            finish_writer(writer).await?;

            match state {
                SessionState::Succeeded => Ok(()),
                _ => Err(Error::Execution("session did not finish".to_string())),
            }
        }

        Commands::Check => {
            let (channel, mut rx) = Channel::new();
            let printer = tokio::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    if let Some(text) = envelope.std_output() {
                        eprint!("{}", text);
                    }
                }
            });

            let resolver = EngineResolver::from_config(&config.engine);
            let result = resolver.ensure_engine(&channel).await;
            drop(channel);
            let _ = printer.await;

            let handle = result?;
            println!(
                "{} Robot Framework {} ({})",
                "✓".green(),
                handle.version.bold(),
                handle.python.display()
            );
            Ok(())
        }

        Commands::Config => {
            match paths::config_path() {
                Some(path) => {
                    let status = if path.exists() {
                        "exists".green()
                    } else {
                        "not found, using defaults".yellow()
                    };
                    println!("{} ({})", path.display(), status);
                }
                None => println!("No configuration directory on this platform"),
            }
            Ok(())
        }
    }
}

/// Run the long-lived serve loop
///
/// Requests are handled one at a time; each gets its own session.
pub async fn serve(socket: Option<String>, log_file: Option<&Path>, config: Config) -> Result<()> {
    if let Some(path) = logging::init_serve(log_file) {
        tracing::info!("Logging to {}", path.display());
    }

    match socket {
        Some(name) => {
            let stream = transport::connect(&name).await?;
            let (reader, writer) = tokio::io::split(stream);
            serve_socket(reader, writer, |ch| Bridge::robot(config, ch)).await
        }
        None => {
            serve_lines(tokio::io::stdin(), tokio::io::stdout(), |ch| {
                Bridge::robot(config, ch)
            })
            .await
        }
    }
}

/// Serve newline-delimited requests, answering with newline-delimited envelopes
///
/// `build` gets the channel the envelopes are written from.
pub async fn serve_lines<R, W, F>(reader: R, writer: W, build: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(Channel) -> Bridge,
{
    let (channel, rx) = Channel::new();
    let writer_task = transport::spawn_writer(rx, writer, Framing::Lines);
    let bridge = build(channel.clone());

    let mut lines = BufReader::new(reader).lines();
    let mut served = 0usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handle_request(&bridge, &channel, line.as_bytes()).await;
        served += 1;
    }

    tracing::info!(served, "Input closed, shutting down");
    drop(bridge);
    drop(channel);
    finish_writer(writer_task).await
}

/// Serve length-prefixed requests over a connected socket
pub async fn serve_socket<R, W, F>(mut reader: R, writer: W, build: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(Channel) -> Bridge,
{
    let (channel, rx) = Channel::new();
    let writer_task = transport::spawn_writer(rx, writer, Framing::LengthPrefixed);
    let bridge = build(channel.clone());

    loop {
        let data = match transport::recv_message(&mut reader).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::error!("Failed to read request: {}", e);
                break;
            }
        };
        handle_request(&bridge, &channel, &data).await;
    }

    tracing::info!("Host disconnected, shutting down");
    drop(bridge);
    drop(channel);
    finish_writer(writer_task).await
}

async fn handle_request(bridge: &Bridge, channel: &Channel, data: &[u8]) {
    match serde_json::from_slice::<SessionRequest>(data) {
        Ok(request) => {
            let state = bridge.run(&request).await;
            tracing::debug!(?state, "Request handled");
        }
        Err(e) => {
            let err = Error::Json(e);
            tracing::warn!("Rejected malformed request: {}", err);
            channel.error(&err);
        }
    }
}

async fn finish_writer(writer: JoinHandle<std::io::Result<usize>>) -> Result<()> {
    match writer.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(Error::Channel(e.to_string())),
        Err(e) => Err(Error::Internal(format!("writer task failed: {}", e))),
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    path.map(read_source).transpose().map(Option::unwrap_or_default)
}

/// Convert CLI flags into the engine's option bundle
fn run_options(args: RunArgs) -> Result<RunOptions> {
    let mut variables = BTreeMap::new();
    for var in &args.variables {
        let (name, value) = var.split_once(':').ok_or_else(|| {
            Error::Config(format!("variable '{}' must be given as name:value", var))
        })?;
        variables.insert(name.to_string(), value.to_string());
    }

    Ok(RunOptions {
        include: args.include,
        exclude: args.exclude,
        skip: args.skip,
        removekeywords: args.removekeywords,
        flattenkeywords: args.flattenkeywords,
        loglevel: args.loglevel,
        consolecolors: args.consolecolors,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ConsoleColors;

    #[test]
    fn test_run_options_from_flags() {
        let opts = run_options(RunArgs {
            include: vec!["smoke".to_string()],
            consolecolors: Some(ConsoleColors::Off),
            variables: vec!["URL:http://localhost:8080".to_string()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(opts.include, vec!["smoke"]);
        assert_eq!(opts.consolecolors, Some(ConsoleColors::Off));
        // Only the first colon separates name and value
        assert_eq!(opts.variables["URL"], "http://localhost:8080");
        assert!(opts.loglevel.is_none());
    }

    #[test]
    fn test_variable_without_colon_rejected() {
        let err = run_options(RunArgs {
            variables: vec!["NOVALUE".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_optional_file_is_empty() {
        assert_eq!(read_optional(None).unwrap(), "");
        assert!(matches!(
            read_optional(Some(Path::new("/nonexistent/keywords.resource"))),
            Err(Error::FileRead { .. })
        ));
    }
}
