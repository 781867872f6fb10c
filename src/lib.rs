//! NVIDIA GPU telemetry from `nvidia-smi`.
//!
//! [`GpuTelemetry::query_devices`] locates the tool, runs one fixed query and
//! decodes the CSV it prints into [`DeviceSample`]s. Failures of any kind
//! come back as an empty vector.

pub mod config;
pub mod error;
pub mod locator;
pub mod models;
pub mod nvidia;
pub mod runner;

pub use config::TelemetryConfig;
pub use error::{ConfigError, LocateError, QueryError};
pub use locator::{Platform, SmiLocator, ToolLocation};
pub use models::{DeviceSample, Snapshot};
pub use nvidia::{decode, get_device_info, parse_gauge, GpuTelemetry};
pub use runner::{CommandOutput, CommandRunner, Invocation, QueryRunner, TokioCommandRunner};
