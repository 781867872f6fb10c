use chrono::{DateTime, Utc};
use serde::Serialize;

/// One telemetry reading for one GPU, as reported by a single nvidia-smi poll.
///
/// Gauges are `None` when the driver reports the sensor as `N/A`. A gauge
/// holding `NaN` was present in the output but was not a number.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSample {
    pub driver_version: String,
    pub sub_device_id: String,
    pub name: String,
    pub pci_bus: String,
    pub fan_speed: Option<f64>,
    pub memory_total: Option<f64>,
    pub memory_used: Option<f64>,
    pub memory_free: Option<f64>,
    pub utilization_gpu: Option<f64>,
    pub utilization_memory: Option<f64>,
    pub temperature_gpu: Option<f64>,
    pub temperature_memory: Option<f64>,
    pub power_draw: Option<f64>,
    pub power_limit: Option<f64>,
    pub clock_core: Option<f64>,
    pub clock_memory: Option<f64>,
}

/// All devices seen by one poll, stamped with the poll instant.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub devices: Vec<DeviceSample>,
}

impl Snapshot {
    pub fn new(devices: Vec<DeviceSample>) -> Self {
        Self {
            taken_at: Utc::now(),
            devices,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
