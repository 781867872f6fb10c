use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const SYSTEM_ROOT_VAR: &str = "WINDIR";
pub const EXECUTABLE_VAR: &str = "GPU_TELEMETRY_SMI";
pub const MAX_OUTPUT_VAR: &str = "GPU_TELEMETRY_MAX_OUTPUT";

pub const DEFAULT_SYSTEM_ROOT: &str = "C:\\Windows";
/// Large enough for machines with many GPUs.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 20000;
pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Skips discovery when set.
    pub executable: Option<PathBuf>,
    pub system_root: PathBuf,
    pub max_output_bytes: usize,
    pub locale: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            executable: None,
            system_root: PathBuf::from(DEFAULT_SYSTEM_ROOT),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_lookup(lookup)
    }

    /// Reads a JSON config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Environment variables override whatever is already set.
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| env::var(key).ok())
    }

    pub fn with_lookup<F>(self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = self;

        if let Some(root) = lookup(SYSTEM_ROOT_VAR).filter(|v| !v.is_empty()) {
            config.system_root = PathBuf::from(root);
        }

        if let Some(exe) = lookup(EXECUTABLE_VAR).filter(|v| !v.is_empty()) {
            config.executable = Some(PathBuf::from(exe));
        }

        if let Some(raw) = lookup(MAX_OUTPUT_VAR).filter(|v| !v.trim().is_empty()) {
            config.max_output_bytes = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: MAX_OUTPUT_VAR,
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }
}
