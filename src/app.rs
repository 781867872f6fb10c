use std::time::Duration;

use gpu_telemetry::{GpuTelemetry, Snapshot, TelemetryConfig};
use tracing::warn;

/// Host-side state for a single poll.
pub struct App {
    telemetry: GpuTelemetry,
    timeout: Option<Duration>,
}

impl App {
    pub fn new(config: &TelemetryConfig, timeout: Option<Duration>) -> Self {
        App {
            telemetry: GpuTelemetry::new(config),
            timeout,
        }
    }

    /// Poll nvidia-smi once, giving up after the configured timeout
    pub async fn poll(&self) -> Snapshot {
        let Some(limit) = self.timeout else {
            return self.telemetry.snapshot().await;
        };

        match tokio::time::timeout(limit, self.telemetry.snapshot()).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "nvidia-smi timed out");
                Snapshot::new(Vec::new())
            }
        }
    }
}
