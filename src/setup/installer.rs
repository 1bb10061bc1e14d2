//! Engine package probing and installation
//!
//! Defines the [`EnginePackage`] trait and the pip-based implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::common::config::EngineConfig;
use crate::common::{Error, Result};
use crate::engine::EngineHandle;

/// Whether the engine can be imported right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Importable, with the version it reported
    Installed(EngineHandle),
    /// Missing or broken
    NotInstalled { reason: String },
}

/// A test engine distribution the bridge can check for and install
#[async_trait]
pub trait EnginePackage: Send + Sync {
    /// Check whether the engine and its native listeners import
    async fn probe(&self) -> Result<ProbeStatus>;

    /// Install the engine packages
    async fn install(&self) -> Result<()>;
}

/// Robot Framework installed with pip into a Python interpreter
#[derive(Debug, Clone)]
pub struct PipPackage {
    python: PathBuf,
    packages: Vec<String>,
    /// Modules that must import besides `robot`
    modules: Vec<String>,
}

impl PipPackage {
    pub fn new(python: PathBuf, packages: Vec<String>, modules: Vec<String>) -> Self {
        Self {
            python,
            packages,
            modules,
        }
    }

    /// Build from configuration, locating the interpreter when unset
    ///
    /// A missing interpreter is not an error here; probing reports it.
    pub fn from_config(config: &EngineConfig) -> Self {
        let python = config.python.clone().unwrap_or_else(find_python);
        let modules = config
            .native_listeners
            .iter()
            .filter_map(|l| listener_module(l))
            .collect();
        Self::new(python, config.packages.clone(), modules)
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Python snippet that imports everything and prints the engine version
    fn probe_script(&self) -> String {
        let mut script = String::from("import robot\n");
        for module in &self.modules {
            script.push_str(&format!("import {}\n", module));
        }
        script.push_str("print(robot.__version__)\n");
        script
    }
}

#[async_trait]
impl EnginePackage for PipPackage {
    async fn probe(&self) -> Result<ProbeStatus> {
        match run_command_args(&self.python, &["-c", &self.probe_script()]).await {
            Ok(stdout) => {
                let version = stdout.trim().to_string();
                tracing::debug!(python = %self.python.display(), %version, "Engine importable");
                Ok(ProbeStatus::Installed(EngineHandle {
                    python: self.python.clone(),
                    version,
                }))
            }
            Err(e) => Ok(ProbeStatus::NotInstalled {
                reason: e.to_string(),
            }),
        }
    }

    async fn install(&self) -> Result<()> {
        if self.packages.is_empty() {
            return Err(Error::Install("no engine packages configured".to_string()));
        }

        let mut args = vec!["-m", "pip", "install"];
        args.extend(self.packages.iter().map(String::as_str));
        tracing::info!(packages = ?self.packages, "Installing engine packages");

        run_command_args(&self.python, &args)
            .await
            .map(|_| ())
            .map_err(|e| Error::Install(e.to_string()))
    }
}

/// Find a Python 3 interpreter on PATH, falling back to the bare name
fn find_python() -> PathBuf {
    for cmd in ["python3", "python"] {
        if let Ok(path) = which::which(cmd) {
            return path;
        }
    }
    tracing::warn!("Python not found on PATH; set engine.python in the config");
    PathBuf::from("python3")
}

/// Module to import for a native listener spec like `Module:arg`
///
/// File-path listeners are skipped.
fn listener_module(spec: &str) -> Option<String> {
    let name = spec.split(':').next()?.trim();
    let valid = !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
    valid.then(|| name.to_string())
}

/// Run a program with arguments and return its stdout
pub async fn run_command_args(program: &Path, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            Error::Internal(format!("Failed to run {}: {}", program.display(), e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
