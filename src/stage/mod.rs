//! Artifact staging
//!
//! Writes the session's source artifacts into the working area under the
//! names the suite refers to them by. Staging is all-or-nothing: names are
//! validated before anything is written, and a failed write removes every
//! file the call already put in place.

pub mod registry;

use std::path::{Component, Path, PathBuf};

use crate::common::{Error, Result};
use crate::ipc::SessionRequest;

pub use registry::{ModuleRegistry, ModuleVersion, Reload};

/// Files the engine writes into the working area; staging must not shadow them
const RESERVED: &[&str] = &["log.html", "report.html", "output.xml"];

/// What a staged file is to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Suite script
    Suite,
    /// Shared resource definitions
    Resource,
    /// Custom keyword library
    Library,
    /// In-page helper library
    InPageLibrary,
    /// Engine listener helper
    Listener,
}

impl Role {
    /// Name the suite imports this artifact by
    pub fn default_target(&self) -> &'static str {
        match self {
            Role::Suite => "test.robot",
            Role::Resource => "keywords.resource",
            Role::Library => "library.py",
            Role::InPageLibrary => "InPageLibrary.py",
            Role::Listener => "BridgeListener.py",
        }
    }

    /// Whether the file is a keyword module the suite imports by stem
    pub fn is_module(&self) -> bool {
        matches!(self, Role::Library | Role::InPageLibrary)
    }
}

/// A named source artifact waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub role: Role,
    pub contents: String,
    /// File name inside the working area
    pub target: String,
}

impl StagedFile {
    pub fn new(role: Role, contents: impl Into<String>) -> Self {
        Self {
            role,
            contents: contents.into(),
            target: role.default_target().to_string(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// The four user artifacts of a request
///
/// Empty artifacts are still staged so that suite imports resolve.
pub fn files_for(request: &SessionRequest) -> Vec<StagedFile> {
    vec![
        StagedFile::new(Role::Suite, request.robot_file.as_str()),
        StagedFile::new(Role::Resource, request.resource_file.as_str()),
        StagedFile::new(Role::Library, request.library_py.as_str()),
        StagedFile::new(Role::InPageLibrary, request.in_page_library.as_str()),
    ]
}

/// Artifacts in place inside a working area
#[derive(Debug, Clone)]
pub struct StagedSuite {
    pub root: PathBuf,
    pub files: Vec<(Role, PathBuf)>,
}

impl StagedSuite {
    /// Path of the first file staged with `role`
    pub fn path(&self, role: Role) -> Option<&Path> {
        self.files
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, p)| p.as_path())
    }

    /// Path of the suite script
    pub fn suite(&self) -> Option<&Path> {
        self.path(Role::Suite)
    }
}

/// Writes artifacts and tracks the keyword modules across sessions
#[derive(Debug, Default)]
pub struct Stager {
    registry: ModuleRegistry,
}

impl Stager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Write `files` into `area`
    pub fn stage(&mut self, area: &Path, files: &[StagedFile]) -> Result<StagedSuite> {
        validate(files)?;

        let mut written: Vec<(Role, PathBuf)> = Vec::with_capacity(files.len());
        for file in files {
            let path = area.join(&file.target);
            if let Err(e) = write_atomic(area, &file.target, &file.contents) {
                rollback(&written);
                return Err(Error::staging(&file.target, e));
            }
            written.push((file.role, path));
        }

        // Versions are committed only once every module refreshed
        let mut registry = self.registry.clone();
        for file in files.iter().filter(|f| f.role.is_module()) {
            let module = module_name(&file.target);
            if let Err(e) = registry.refresh(area, module, &file.contents) {
                rollback(&written);
                return Err(Error::staging(&file.target, e));
            }
        }
        self.registry = registry;

        tracing::debug!(area = %area.display(), files = written.len(), "Artifacts staged");
        Ok(StagedSuite {
            root: area.to_path_buf(),
            files: written,
        })
    }
}

/// Check every target name before the first write
fn validate(files: &[StagedFile]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for file in files {
        check_name(&file.target).map_err(|reason| Error::staging(&file.target, reason))?;
        if !seen.insert(file.target.as_str()) {
            return Err(Error::staging(&file.target, "name is used by more than one artifact"));
        }
    }
    Ok(())
}

fn check_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => {}
        _ => return Err("name must be a plain file name inside the working area"),
    }
    if name.contains(|c: char| c == '/' || c == '\\') {
        return Err("name must be a plain file name inside the working area");
    }
    if RESERVED.contains(&name) {
        return Err("name is reserved for engine output");
    }
    Ok(())
}

/// Write to a hidden sibling, then rename over the target
///
/// The sibling never outlives a failed write or rename.
fn write_atomic(area: &Path, name: &str, contents: &str) -> std::io::Result<()> {
    let tmp = area.join(format!(".{}.staging", name));
    let result = std::fs::write(&tmp, contents).and_then(|()| std::fs::rename(&tmp, area.join(name)));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn rollback(written: &[(Role, PathBuf)]) {
    for (_, path) in written {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove {} after staging error: {}", path.display(), e);
        }
    }
}

/// Python module name of a staged file
fn module_name(target: &str) -> &str {
    target.strip_suffix(".py").unwrap_or(target)
}
