use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::config::TelemetryConfig;
use crate::locator::SmiLocator;
use crate::models::{DeviceSample, Snapshot};
use crate::runner::{CommandRunner, QueryRunner};

pub const FIELD_COUNT: usize = 16;
pub const FIELD_SEPARATOR: &str = ", ";
/// nvidia-smi prints this (sometimes bracketed) for unsupported sensors.
pub const NOT_AVAILABLE: &str = "N/A";

/// Decodes `--format=csv,noheader,nounits` output, one sample per GPU line.
///
/// Lines that do not split into exactly [`FIELD_COUNT`] fields are skipped.
pub fn decode(text: &str) -> Vec<DeviceSample> {
    text.lines()
        .filter(|line| !line.is_empty())
        .filter_map(decode_line)
        .collect()
}

pub fn decode_line(line: &str) -> Option<DeviceSample> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    let Ok(fields) = <[&str; FIELD_COUNT]>::try_from(fields) else {
        debug!(line, "skipping malformed nvidia-smi line");
        return None;
    };

    let [driver_version, sub_device_id, name, pci_bus, fan_speed, memory_total, memory_used, memory_free, utilization_gpu, utilization_memory, temperature_gpu, temperature_memory, power_draw, power_limit, clock_core, clock_memory] =
        fields;

    Some(DeviceSample {
        driver_version: driver_version.to_string(),
        sub_device_id: sub_device_id.to_string(),
        name: name.to_string(),
        pci_bus: pci_bus.to_string(),
        fan_speed: parse_gauge(fan_speed),
        memory_total: parse_gauge(memory_total),
        memory_used: parse_gauge(memory_used),
        memory_free: parse_gauge(memory_free),
        utilization_gpu: parse_gauge(utilization_gpu),
        utilization_memory: parse_gauge(utilization_memory),
        temperature_gpu: parse_gauge(temperature_gpu),
        temperature_memory: parse_gauge(temperature_memory),
        power_draw: parse_gauge(power_draw),
        power_limit: parse_gauge(power_limit),
        clock_core: parse_gauge(clock_core),
        clock_memory: parse_gauge(clock_memory),
    })
}

/// Converts one gauge column.
///
/// - any text containing `N/A` is an absent reading: `None`
/// - otherwise the longest leading number is taken, so `"45 %"` reads as 45
/// - text with no leading number is kept as `Some(NaN)` instead of failing
///   the whole line
pub fn parse_gauge(field: &str) -> Option<f64> {
    if field.contains(NOT_AVAILABLE) {
        return None;
    }
    Some(parse_leading_float(field))
}

fn parse_leading_float(raw: &str) -> f64 {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if bytes[0] == b'-' {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_end = digits_from(end);
    let mut digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        digits += frac_end - (end + 1);
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// Entry point for hosts: one call, one poll, never an error.
pub struct GpuTelemetry {
    query: QueryRunner,
}

impl GpuTelemetry {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            query: QueryRunner::from_config(config),
        }
    }

    pub fn with_runner(
        locator: SmiLocator,
        runner: Arc<dyn CommandRunner>,
        config: &TelemetryConfig,
    ) -> Self {
        Self {
            query: QueryRunner::new(locator, runner, config),
        }
    }

    /// Every GPU nvidia-smi reports right now, in its output order.
    ///
    /// An empty vector covers both "no NVIDIA GPU" and "the query failed";
    /// the reason is only logged.
    pub async fn query_devices(&self) -> Vec<DeviceSample> {
        match self.query.run().await {
            Some(output) => decode(&output),
            None => Vec::new(),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.query_devices().await)
    }
}

impl Default for GpuTelemetry {
    fn default() -> Self {
        Self::new(&config_or_default(|key| std::env::var(key).ok()))
    }
}

/// Environment config for the shared instance; a bad value means defaults,
/// since the top-level query never fails.
fn config_or_default<F>(lookup: F) -> TelemetryConfig
where
    F: Fn(&str) -> Option<String>,
{
    TelemetryConfig::from_lookup(lookup).unwrap_or_else(|e| {
        warn!("ignoring telemetry environment: {}", e);
        TelemetryConfig::default()
    })
}

/// Process-wide instance so the executable is located only once.
pub fn shared() -> &'static GpuTelemetry {
    static SHARED: OnceLock<GpuTelemetry> = OnceLock::new();
    SHARED.get_or_init(GpuTelemetry::default)
}

/// Polls every GPU once through the shared instance.
pub async fn get_device_info() -> Vec<DeviceSample> {
    shared().query_devices().await
}
