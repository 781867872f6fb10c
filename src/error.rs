use std::path::PathBuf;

use thiserror::Error;

/// Why the nvidia-smi executable could not be located.
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no nvidia-smi.exe found under {0}")]
    NotFound(PathBuf),
}

/// Why a query produced no usable output.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("nvidia-smi could not be located")]
    ToolNotFound,

    #[error("failed to execute nvidia-smi: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("nvidia-smi exited with an error")]
    ExitStatus,

    #[error("nvidia-smi wrote to stderr: {0}")]
    Stderr(String),

    #[error("nvidia-smi output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
