mod app;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use gpu_telemetry::TelemetryConfig;
use tracing_subscriber::EnvFilter;

use crate::app::App;

#[derive(Parser)]
#[command(name = "gpu-telemetry")]
#[command(about = "Print one NVIDIA GPU telemetry snapshot from nvidia-smi", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// JSON config file; environment variables override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to nvidia-smi, skipping discovery
    #[arg(long)]
    smi: Option<PathBuf>,

    /// Give up on nvidia-smi after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gpu_telemetry=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => TelemetryConfig::load(path)?,
        None => TelemetryConfig::default(),
    };
    let mut config = base.with_env()?;
    if let Some(smi) = cli.smi {
        config.executable = Some(smi);
    }

    let app = App::new(&config, cli.timeout_ms.map(Duration::from_millis));
    let snapshot = app.poll().await;

    match cli.format {
        Format::Table => print!("{}", render::table(&snapshot)),
        Format::Json => println!("{}", render::json(&snapshot)?),
    }

    Ok(())
}
