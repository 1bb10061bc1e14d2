//! robot-bridge - runs Robot Framework suites on behalf of a host page
//!
//! Stages the host's suite and libraries, runs the engine with its console
//! output captured, and streams progress and the final report back as JSON
//! envelopes.

use std::path::PathBuf;

use clap::Parser;
use robot_bridge::common::config::Config;
use robot_bridge::common::logging;
use robot_bridge::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "robot-bridge", about = "Robot Framework execution bridge")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Serve mode sets up its own file logging
    if !matches!(cli.command, Commands::Serve { .. }) {
        logging::init_cli();
    }

    let result = async move {
        let config = match &cli.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        match cli.command {
            Commands::Serve { socket, log_file } => {
                cli::serve(socket, log_file.as_deref(), config).await
            }
            command => cli::dispatch(command, config).await,
        }
    }
    .await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
