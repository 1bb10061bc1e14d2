//! CLI command definitions
//!
//! Defines the clap commands for the robot-bridge CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::engine::ConsoleColors;

#[derive(Subcommand)]
pub enum Commands {
    /// Run one suite from files on disk and stream envelopes to the host
    Run {
        /// Suite script (staged as test.robot)
        suite: PathBuf,

        /// Shared resource file (staged as keywords.resource)
        #[arg(long, short)]
        resource: Option<PathBuf>,

        /// Custom keyword library (staged as library.py)
        #[arg(long, short)]
        library: Option<PathBuf>,

        /// In-page helper library (staged as InPageLibrary.py)
        #[arg(long)]
        in_page_library: Option<PathBuf>,

        #[command(flatten)]
        options: RunArgs,

        /// Send envelopes to this local socket instead of stdout
        #[arg(long)]
        socket: Option<String>,
    },

    /// Run sessions for requests read from stdin, one JSON object per line
    Serve {
        /// Exchange requests and envelopes over this local socket instead
        /// (length-prefixed JSON)
        #[arg(long)]
        socket: Option<String>,

        /// Log file (default: <data dir>/logs/serve.log)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Make sure the test engine is installed and print its version
    Check,

    /// Print the configuration file location
    Config,
}

/// Engine options for a run
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only run tests with this tag (repeatable)
    #[arg(long, short)]
    pub include: Vec<String>,

    /// Do not run tests with this tag (repeatable)
    #[arg(long, short)]
    pub exclude: Vec<String>,

    /// Skip tests with this tag (repeatable)
    #[arg(long)]
    pub skip: Vec<String>,

    /// Remove keyword data from the report (repeatable)
    #[arg(long)]
    pub removekeywords: Vec<String>,

    /// Flatten matching keywords in the report (repeatable)
    #[arg(long)]
    pub flattenkeywords: Vec<String>,

    /// Log level, e.g. TRACE:INFO
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Console colors: auto, on, ansi or off
    #[arg(long)]
    pub consolecolors: Option<ConsoleColors>,

    /// Suite variable as name:value (repeatable)
    #[arg(long = "variable", short = 'v')]
    pub variables: Vec<String>,
}
