use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use tracing::{debug, instrument};

use crate::config::TelemetryConfig;
use crate::error::LocateError;

pub const SMI_COMMAND: &str = "nvidia-smi";
pub const SMI_EXECUTABLE: &str = "nvidia-smi.exe";

/// Driver packages live under `<system root>/System32/DriverStore/FileRepository`.
const DRIVER_REPOSITORY: [&str; 3] = ["System32", "DriverStore", "FileRepository"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// Where nvidia-smi lives: a bare command name left to PATH lookup, or a
/// discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLocation {
    Command(String),
    Path(PathBuf),
}

impl ToolLocation {
    pub fn program(&self) -> &Path {
        match self {
            ToolLocation::Command(name) => Path::new(name),
            ToolLocation::Path(path) => path,
        }
    }
}

/// Resolves the nvidia-smi location once and remembers the answer.
///
/// Only a successful lookup is cached, and it is never invalidated. A failed
/// lookup is retried on the next call, so a driver installed later is found.
#[derive(Debug)]
pub struct SmiLocator {
    platform: Platform,
    system_root: PathBuf,
    executable: Option<PathBuf>,
    resolved: OnceLock<ToolLocation>,
}

impl SmiLocator {
    pub fn new(platform: Platform, system_root: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            system_root: system_root.into(),
            executable: None,
            resolved: OnceLock::new(),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        let mut locator = Self::new(Platform::current(), config.system_root.clone());
        locator.executable = config.executable.clone();
        locator
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn resolve(&self) -> Option<ToolLocation> {
        if let Some(location) = self.resolved.get() {
            return Some(location.clone());
        }

        match self.try_resolve() {
            Ok(location) => {
                debug!(?location, "resolved nvidia-smi");
                // A concurrent first caller may have stored first; keep theirs.
                Some(self.resolved.get_or_init(|| location).clone())
            }
            Err(e) => {
                debug!("nvidia-smi not resolved: {}", e);
                None
            }
        }
    }

    fn try_resolve(&self) -> Result<ToolLocation, LocateError> {
        if let Some(exe) = &self.executable {
            return Ok(ToolLocation::Path(exe.clone()));
        }

        match self.platform {
            Platform::Linux => Ok(ToolLocation::Command(SMI_COMMAND.to_string())),
            Platform::Windows => {
                let repository = driver_repository(&self.system_root);
                newest_executable(&repository).map(ToolLocation::Path)
            }
            Platform::Other => Err(LocateError::UnsupportedPlatform(std::env::consts::OS)),
        }
    }
}

pub fn driver_repository(system_root: &Path) -> PathBuf {
    DRIVER_REPOSITORY
        .iter()
        .fold(system_root.to_path_buf(), |path, part| path.join(part))
}

/// Finds the most recently changed `nvidia-smi.exe` among the immediate
/// subdirectories of `repository`.
///
/// Subdirectories are visited in file-name order; when two executables share
/// a change time the one visited first is kept.
#[instrument(level = "debug")]
pub fn newest_executable(repository: &Path) -> Result<PathBuf, LocateError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| LocateError::Io { path, source }
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(repository).map_err(io_err(repository))? {
        let entry = entry.map_err(io_err(repository))?;
        let path = entry.path();
        // Follows symlinks, so a linked driver package still counts.
        let meta = fs::metadata(&path).map_err(io_err(&path))?;
        if meta.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut newest: Option<(PathBuf, SystemTime)> = None;
    for dir in dirs {
        if !contains_executable(&dir)? {
            continue;
        }

        let exe = dir.join(SMI_EXECUTABLE);
        let changed = fs::metadata(&exe)
            .and_then(|meta| meta.modified())
            .map_err(io_err(&exe))?;

        let is_newer = newest.as_ref().map_or(true, |(_, best)| changed > *best);
        if is_newer {
            newest = Some((exe, changed));
        }
    }

    newest
        .map(|(exe, _)| exe)
        .ok_or_else(|| LocateError::NotFound(repository.to_path_buf()))
}

fn contains_executable(dir: &Path) -> Result<bool, LocateError> {
    let entries = fs::read_dir(dir).map_err(|source| LocateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| LocateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_name() == SMI_EXECUTABLE {
            return Ok(true);
        }
    }
    Ok(false)
}
