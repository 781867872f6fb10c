use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use gpu_telemetry::locator::driver_repository;
use gpu_telemetry::{
    CommandOutput, CommandRunner, GpuTelemetry, Invocation, Platform, SmiLocator, TelemetryConfig,
};
use tempfile::tempdir;

const TWO_GPUS: &str = "\
470.63.01, 0x1234, NVIDIA GeForce RTX 3080, 00000000:01:00.0, 45, 10240, 2048, 8192, 12, 8, 65, N/A, 220.5, 320, 1800, 9500
470.63.01, 0x1234, NVIDIA GeForce RTX 3080, 00000000:02:00.0, 30, 10240, 1024, 9216, 0, 0, 41, N/A, 25.1, 320, 210, 405
";

/// Replays the same output for every call and records what was launched.
struct FakeSmi {
    output: CommandOutput,
    launched: Mutex<Vec<Invocation>>,
}

impl FakeSmi {
    fn new(stdout: &str, stderr: &str, success: bool) -> Arc<Self> {
        Arc::new(Self {
            output: CommandOutput {
                success,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            launched: Mutex::new(Vec::new()),
        })
    }

    fn launches(&self) -> Vec<Invocation> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeSmi {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.launched.lock().unwrap().push(invocation.clone());
        Ok(self.output.clone())
    }
}

struct FailingSpawn;

#[async_trait]
impl CommandRunner for FailingSpawn {
    async fn run(&self, _: &Invocation) -> io::Result<CommandOutput> {
        Err(io::Error::new(io::ErrorKind::NotFound, "nvidia-smi: not found"))
    }
}

fn linux(runner: Arc<dyn CommandRunner>) -> GpuTelemetry {
    GpuTelemetry::with_runner(
        SmiLocator::new(Platform::Linux, "/unused"),
        runner,
        &TelemetryConfig::default(),
    )
}

#[tokio::test]
async fn two_gpus_in_output_order() {
    let telemetry = linux(FakeSmi::new(TWO_GPUS, "", true));

    let devices = telemetry.query_devices().await;
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].pci_bus, "00000000:01:00.0");
    assert_eq!(devices[0].temperature_memory, None);
    assert_eq!(devices[0].power_draw, Some(220.5));
    assert_eq!(devices[1].pci_bus, "00000000:02:00.0");
    assert_eq!(devices[1].clock_memory, Some(405.0));
}

#[tokio::test]
async fn stderr_chatter_empties_the_result() {
    let telemetry = linux(FakeSmi::new(TWO_GPUS, "Unable to determine the device handle\n", true));
    assert!(telemetry.query_devices().await.is_empty());
}

#[tokio::test]
async fn failed_exit_empties_the_result() {
    let telemetry = linux(FakeSmi::new(TWO_GPUS, "", false));
    assert!(telemetry.query_devices().await.is_empty());
}

#[tokio::test]
async fn spawn_failure_empties_the_result() {
    let telemetry = linux(Arc::new(FailingSpawn));
    assert!(telemetry.query_devices().await.is_empty());
}

#[tokio::test]
async fn empty_output_is_no_devices() {
    let telemetry = linux(FakeSmi::new("", "", true));
    let snapshot = telemetry.snapshot().await;
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn unsupported_platform_never_launches() {
    let fake = FakeSmi::new(TWO_GPUS, "", true);
    let telemetry = GpuTelemetry::with_runner(
        SmiLocator::new(Platform::Other, "/unused"),
        fake.clone(),
        &TelemetryConfig::default(),
    );

    assert!(telemetry.query_devices().await.is_empty());
    assert!(fake.launches().is_empty());
}

#[tokio::test]
async fn windows_launches_newest_driver_copy_once_discovered() {
    let root = tempdir().unwrap();
    let repo = driver_repository(root.path());
    let mut newest = PathBuf::new();
    for (dir, secs) in [("nv_a", 1_600_000_000u64), ("nv_b", 1_700_000_000), ("nv_c", 1_650_000_000)] {
        let dir = repo.join(dir);
        fs::create_dir_all(&dir).unwrap();
        let exe = dir.join("nvidia-smi.exe");
        File::create(&exe)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
        if secs == 1_700_000_000 {
            newest = exe;
        }
    }

    let fake = FakeSmi::new(TWO_GPUS, "", true);
    let telemetry = GpuTelemetry::with_runner(
        SmiLocator::new(Platform::Windows, root.path()),
        fake.clone(),
        &TelemetryConfig::default(),
    );

    assert_eq!(telemetry.query_devices().await.len(), 2);

    // The cached location survives the driver directory disappearing.
    fs::remove_dir_all(&repo).unwrap();
    assert_eq!(telemetry.query_devices().await.len(), 2);

    let launches = fake.launches();
    assert_eq!(launches.len(), 2);
    assert!(launches.iter().all(|inv| inv.program == newest));
    assert!(launches.iter().all(|inv| !inv.discard_stderr));
}
