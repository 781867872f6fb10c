use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::TelemetryConfig;
use crate::error::QueryError;
use crate::locator::{Platform, SmiLocator, ToolLocation};

/// Queried columns, in the order the decoder expects them.
pub const QUERY_FIELDS: [&str; 16] = [
    "driver_version",
    "pci.sub_device_id",
    "name",
    "pci.bus_id",
    "fan.speed",
    "memory.total",
    "memory.used",
    "memory.free",
    "utilization.gpu",
    "utilization.memory",
    "temperature.gpu",
    "temperature.memory",
    "power.draw",
    "power.limit",
    "clocks.gr",
    "clocks.mem",
];

pub const FORMAT_ARG: &str = "--format=csv,noheader,nounits";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub fn query_arg() -> String {
    format!("--query-gpu={}", QUERY_FIELDS.join(","))
}

/// Everything needed to launch one nvidia-smi process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub hidden_window: bool,
    pub max_output_bytes: usize,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub discard_stderr: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a process to completion and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if invocation.discard_stderr {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .kill_on_drop(true);

        #[cfg(windows)]
        if invocation.hidden_window {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let output = cmd.output().await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Invokes nvidia-smi with the fixed telemetry query.
pub struct QueryRunner {
    locator: SmiLocator,
    runner: Arc<dyn CommandRunner>,
    max_output_bytes: usize,
    locale: String,
}

impl QueryRunner {
    pub fn new(locator: SmiLocator, runner: Arc<dyn CommandRunner>, config: &TelemetryConfig) -> Self {
        Self {
            locator,
            runner,
            max_output_bytes: config.max_output_bytes,
            locale: config.locale.clone(),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            SmiLocator::from_config(config),
            Arc::new(TokioCommandRunner),
            config,
        )
    }

    pub fn invocation(&self, location: &ToolLocation) -> Invocation {
        Invocation {
            program: location.program().to_path_buf(),
            args: vec![query_arg(), FORMAT_ARG.to_string()],
            hidden_window: true,
            max_output_bytes: self.max_output_bytes,
            env: vec![("LANG".to_string(), self.locale.clone())],
            discard_stderr: self.locator.platform() == Platform::Linux,
        }
    }

    /// Raw CSV output, or `None` on any failure.
    pub async fn run(&self) -> Option<String> {
        match self.try_run().await {
            Ok(stdout) => Some(stdout),
            Err(QueryError::ToolNotFound) => {
                debug!("nvidia-smi unavailable, no telemetry");
                None
            }
            Err(e) => {
                warn!("GPU telemetry query failed: {}", e);
                None
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn try_run(&self) -> Result<String, QueryError> {
        let location = self.locator.resolve().ok_or(QueryError::ToolNotFound)?;
        let invocation = self.invocation(&location);

        debug!(program = %invocation.program.display(), "querying nvidia-smi");
        let output = self.runner.run(&invocation).await?;

        let limit = invocation.max_output_bytes;
        if output.stdout.len() > limit || output.stderr.len() > limit {
            return Err(QueryError::OutputTooLarge { limit });
        }
        // Any stderr text invalidates the result, even on a zero exit code.
        if !output.stderr.is_empty() {
            return Err(QueryError::Stderr(output.stderr.trim().to_string()));
        }
        if !output.success {
            return Err(QueryError::ExitStatus);
        }

        Ok(output.stdout)
    }
}
