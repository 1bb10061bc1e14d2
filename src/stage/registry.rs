//! Registry of staged keyword modules
//!
//! Maps each user-supplied module to the version the bridge last staged.
//! When the code changes between sessions the module's generation is bumped
//! and any compiled bytecode left for it is removed, so the interpreter
//! cannot load a stale copy.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::common::Result;

/// Version of a staged module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    /// SHA-256 of the module source, lowercase hex
    pub digest: String,
    /// Starts at 1, incremented on every change
    pub generation: u64,
}

/// What refreshing a module did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reload {
    /// First time this module is staged
    Loaded,
    /// Source changed since the previous session
    Reloaded { generation: u64 },
    /// Same source as the previous session
    Unchanged,
}

/// Current code version of every staged module
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleVersion>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record freshly staged source for `module` and drop its stale bytecode
    pub fn refresh(&mut self, area: &Path, module: &str, source: &str) -> Result<Reload> {
        let digest = format!("{:x}", Sha256::digest(source.as_bytes()));

        let reload = match self.modules.get_mut(module) {
            None => {
                self.modules.insert(
                    module.to_string(),
                    ModuleVersion {
                        digest,
                        generation: 1,
                    },
                );
                Reload::Loaded
            }
            Some(version) if version.digest == digest => Reload::Unchanged,
            Some(version) => {
                version.digest = digest;
                version.generation += 1;
                Reload::Reloaded {
                    generation: version.generation,
                }
            }
        };

        let removed = invalidate_bytecode(area, module)?;
        tracing::debug!(module, ?reload, removed, "Module refreshed");
        Ok(reload)
    }

    /// Version last staged for `module`
    pub fn version(&self, module: &str) -> Option<&ModuleVersion> {
        self.modules.get(module)
    }
}

/// Remove `__pycache__/<module>.*.pyc` under `area`, returning how many went
fn invalidate_bytecode(area: &Path, module: &str) -> Result<usize> {
    let cache = area.join("__pycache__");
    if !cache.is_dir() {
        return Ok(0);
    }

    let prefix = format!("{}.", module);
    let mut removed = 0;
    for entry in std::fs::read_dir(&cache)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".pyc") {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
