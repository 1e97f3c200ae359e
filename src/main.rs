//! screenwatch command-line interface

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use screenwatch_lib::capture::{FrameSource, JpegCompressor, SyntheticSource};
use screenwatch_lib::commands;
use screenwatch_lib::config::RecorderSettings;
use screenwatch_lib::downstream::FfmpegConverter;
use screenwatch_lib::recorder::{RecordingController, RecordingEvent};
use screenwatch_lib::utils::ErrorResponse;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on waiting for downstream work when stopping on a signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(name = "screenwatch")]
#[command(
    author,
    version,
    about = "Continuous segmented screen-region recorder",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record segments until interrupted
    Record(RecordArgs),
    /// Print the headers of a recorded segment as JSON
    Probe {
        file: PathBuf,
    },
    /// Write a settings file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Region as x,y,w,h in logical pixels (defaults to the last region)
    #[arg(long, value_parser = parse_region)]
    region: Option<[f64; 4]>,

    /// Display scale factor used to convert the region to physical pixels
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// File name prefix for the segments
    #[arg(short, long)]
    label: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long)]
    segment_minutes: Option<f64>,

    /// Disable the timestamp overlay
    #[arg(long)]
    no_overlay: bool,

    /// Convert finished segments to MP4 with FFmpeg
    #[arg(long)]
    convert: bool,

    /// Record a generated test pattern instead of the screen
    #[arg(long)]
    synthetic: bool,

    /// Stop after this many seconds
    #[arg(long)]
    max_seconds: Option<u64>,
}

fn parse_region(s: &str) -> Result<[f64; 4], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err("Region must be x,y,w,h".to_string());
    }
    let mut values = [0.0; 4];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part.parse().map_err(|_| format!("Invalid number: {}", part))?;
    }
    Ok(values)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    screenwatch_lib::init_tracing();
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => RecorderSettings::default_path()?,
    };

    match cli.command {
        Commands::Record(args) => record(config_path, args).await,
        Commands::Probe { file } => match commands::probe_segment(&file) {
            Ok(info) => {
                println!("{}", serde_json::to_string_pretty(&info)?);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to probe {:?}: {}", file, e);
                println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(e))?);
                std::process::exit(1);
            }
        },
        Commands::InitConfig { force } => {
            commands::init_config(&config_path, force)?;
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

async fn record(config_path: PathBuf, args: RecordArgs) -> anyhow::Result<()> {
    tracing::info!("Starting screenwatch v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = RecorderSettings::load_or_default(&config_path);
    if let Some(output) = args.output {
        settings.output_dir = Some(output);
    }
    if let Some(fps) = args.fps {
        settings.fps = fps;
    }
    if let Some(minutes) = args.segment_minutes {
        settings.segment_minutes = minutes;
    }
    if let Some(label) = args.label {
        settings.label = label;
    }
    if args.no_overlay {
        settings.overlay.enabled = false;
    }
    if args.convert {
        settings.conversion.enabled = true;
    }

    let region = commands::resolve_region(&mut settings, args.region, args.scale)?;
    if args.region.is_some() {
        if let Err(e) = settings.save(&config_path) {
            tracing::warn!("Could not remember region: {}", e);
        }
    }

    let source: Arc<dyn FrameSource> = if args.synthetic {
        Arc::new(SyntheticSource::new())
    } else {
        screen_source()?
    };

    let (mut controller, mut events) =
        RecordingController::new(settings.session_config()?, source, Arc::new(JpegCompressor));
    if settings.conversion.enabled {
        controller.add_sink(Arc::new(FfmpegConverter::new(&settings.conversion)));
    }

    controller.start(region, &settings.label).await?;

    let deadline = async {
        match args.max_seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, finishing current segment");
                break;
            }
            _ = &mut deadline => {
                tracing::info!("Time limit reached");
                break;
            }
            event = events.recv() => match event {
                Some(RecordingEvent::SegmentCompleted { number, path, .. }) => {
                    println!("segment {:03} {}", number, path.display());
                }
                Some(RecordingEvent::Status { message }) => tracing::debug!("{}", message),
                Some(RecordingEvent::RecordingError { message }) => {
                    tracing::error!("Recording failed: {}", message);
                    break;
                }
                Some(RecordingEvent::SessionStopped { .. }) | None => break,
                Some(RecordingEvent::SessionStarted { session_id, label }) => {
                    tracing::info!("Session {} ({}) started", session_id, label);
                }
            }
        }
    }

    let summary = tokio::time::timeout(SHUTDOWN_GRACE, controller.stop())
        .await
        .context("Timed out waiting for downstream work")??;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(feature = "screen")]
fn screen_source() -> anyhow::Result<Arc<dyn FrameSource>> {
    Ok(Arc::new(screenwatch_lib::capture::ScreenSource::new()))
}

#[cfg(not(feature = "screen"))]
fn screen_source() -> anyhow::Result<Arc<dyn FrameSource>> {
    anyhow::bail!(
        "Built without screen capture; rebuild with --features screen or pass --synthetic"
    )
}
