use gpu_telemetry::{DeviceSample, Snapshot};

/// One line per GPU, `-` for sensors the driver does not report.
pub fn table(snapshot: &Snapshot) -> String {
    if snapshot.is_empty() {
        return "no NVIDIA GPU telemetry available\n".to_string();
    }

    let mut out = format!("{}\n", snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (idx, gpu) in snapshot.devices.iter().enumerate() {
        out.push_str(&device_line(idx, gpu));
        out.push('\n');
    }
    out
}

fn device_line(idx: usize, gpu: &DeviceSample) -> String {
    format!(
        "GPU {} | {} | {} | driver {} | util {}% mem-util {}% | mem {}/{} MiB ({} free) | \
         temp {}/{} C | power {}/{} W | clocks {}/{} MHz | fan {}%",
        idx,
        gpu.name,
        gpu.pci_bus,
        gpu.driver_version,
        gauge(gpu.utilization_gpu),
        gauge(gpu.utilization_memory),
        gauge(gpu.memory_used),
        gauge(gpu.memory_total),
        gauge(gpu.memory_free),
        gauge(gpu.temperature_gpu),
        gauge(gpu.temperature_memory),
        gauge(gpu.power_draw),
        gauge(gpu.power_limit),
        gauge(gpu.clock_core),
        gauge(gpu.clock_memory),
        gauge(gpu.fan_speed),
    )
}

fn gauge(value: Option<f64>) -> String {
    match value {
        None => "-".to_string(),
        Some(v) if v.is_nan() => "?".to_string(),
        Some(v) => v.to_string(),
    }
}

pub fn json(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_telemetry::decode;

    const LINE: &str = "535.104.05, 0x1467, NVIDIA A100-SXM4-40GB, 00000000:07:00.0, N/A, 40960, 4, 40337, 0, 0, 31, 38, 52.1, 400, 210, 1215";

    #[test]
    fn table_marks_missing_gauges() {
        let snapshot = Snapshot::new(decode(LINE));
        let text = table(&snapshot);
        assert!(text.contains("GPU 0 | NVIDIA A100-SXM4-40GB | 00000000:07:00.0"));
        assert!(text.contains("fan -%"));
        assert!(text.contains("power 52.1/400 W"));
    }

    #[test]
    fn table_for_no_devices() {
        assert_eq!(
            table(&Snapshot::new(Vec::new())),
            "no NVIDIA GPU telemetry available\n"
        );
    }

    #[test]
    fn json_has_timestamp_and_devices() {
        let snapshot = Snapshot::new(decode(LINE));
        let value: serde_json::Value = serde_json::from_str(&json(&snapshot).unwrap()).unwrap();
        assert!(value["takenAt"].is_string());
        assert_eq!(value["devices"][0]["name"], "NVIDIA A100-SXM4-40GB");
        assert!(value["devices"][0]["fanSpeed"].is_null());
    }
}
