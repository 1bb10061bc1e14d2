//! Test engine invocation contract
//!
//! The engine (Robot Framework) is an external collaborator. The bridge only
//! needs to start it on a staged suite, connect its output to an
//! [`OutputSink`], and have it call a [`Listener`] at every boundary.

pub mod listener;
pub mod robot;
pub mod stream;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::capture::OutputSink;
use crate::common::config::Defaults;
use crate::common::Result;
use crate::stage::StagedFile;

pub use listener::{Boundary, BoundaryKind, Listener, ProgressListener};

/// A resolved, importable engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    /// Interpreter that can import the engine
    pub python: PathBuf,
    /// Engine version string as reported by the engine
    pub version: String,
}

/// Console color mode passed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleColors {
    Auto,
    On,
    Ansi,
    Off,
}

impl ConsoleColors {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleColors::Auto => "auto",
            ConsoleColors::On => "on",
            ConsoleColors::Ansi => "ansi",
            ConsoleColors::Off => "off",
        }
    }
}

impl std::str::FromStr for ConsoleColors {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ConsoleColors::Auto),
            "on" => Ok(ConsoleColors::On),
            "ansi" => Ok(ConsoleColors::Ansi),
            "off" => Ok(ConsoleColors::Off),
            other => Err(format!(
                "unknown console colors '{}', expected auto, on, ansi or off",
                other
            )),
        }
    }
}

/// Configuration bundle for one run
///
/// Tag filters accept a single string or a list. Unset options fall back to
/// the configured defaults, then to the engine's own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default, deserialize_with = "one_or_many")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub skip: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub removekeywords: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub flattenkeywords: Vec<String>,
    #[serde(default)]
    pub loglevel: Option<String>,
    #[serde(default)]
    pub consolecolors: Option<ConsoleColors>,
    /// Suite variables, passed as `name:value`
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl RunOptions {
    /// Fill unset options from the configured defaults
    pub fn with_defaults(mut self, defaults: &Defaults) -> Self {
        if self.loglevel.is_none() {
            self.loglevel = Some(defaults.loglevel.clone());
        }
        if self.consolecolors.is_none() {
            self.consolecolors = Some(defaults.consolecolors);
        }
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Everything the engine needs for one run
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub handle: &'a EngineHandle,
    /// Staged suite script
    pub suite: &'a Path,
    /// Working area; also the engine's output directory
    pub working_area: &'a Path,
    pub options: &'a RunOptions,
    /// Engine-native observers registered next to the bridge listener
    pub native_listeners: &'a [String],
    /// Merge stderr into the captured output
    pub capture_stderr: bool,
}

/// How the engine process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineExit {
    pub code: i32,
}

impl EngineExit {
    /// Number of failed tests, when the exit code encodes a verdict
    ///
    /// The engine caps the count at 250.
    pub fn failed_tests(&self) -> Option<u32> {
        (0..=250).contains(&self.code).then_some(self.code as u32)
    }
}

/// A test engine the bridge can drive
#[async_trait]
pub trait Engine: Send + Sync {
    /// Helper files the engine needs staged next to the suite
    fn helper_files(&self) -> Vec<StagedFile> {
        Vec::new()
    }

    /// Run the suite to completion
    ///
    /// All engine output goes through `sink` and every boundary is reported
    /// to `listener` in the order the engine raises it. Failing tests are
    /// not an error; an engine crash or interruption is.
    async fn run(
        &self,
        invocation: &Invocation<'_>,
        listener: &mut dyn Listener,
        sink: &OutputSink,
    ) -> Result<EngineExit>;
}
