use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info};

use trikiosk::capture::{CameraCapture, MicrophoneCapture};
use trikiosk::config::KioskConfig;
use trikiosk::loader::{ModelLoader, NullRuntime};
use trikiosk::panel::{AudioPanel, ImagePanel, PosePanel};
use trikiosk::render::LogSink;

#[derive(Parser)]
#[command(name = "trikiosk")]
#[command(about = "Real-time multimodal classification kiosk with demo-mode fallback")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "kiosk.toml")]
    config: String,

    /// Panel to run: image, audio, or pose
    #[arg(short, long, default_value = "image")]
    panel: String,

    /// Camera device index
    #[arg(short = 'd', long, default_value = "0")]
    camera_device: u32,

    /// Stop after this many seconds (runs until Ctrl-C when absent)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Classify a still image instead of running the camera loop
    /// (image panel only)
    #[arg(long)]
    still: Option<PathBuf>,

    /// Play this sample clip before the audio panel starts
    #[arg(long)]
    clip: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("trikiosk={}", log_level))
        .try_init();

    info!("Starting trikiosk classification kiosk");

    let config = KioskConfig::load(&args.config).await?;
    info!("Configuration loaded successfully");

    // No inference runtime ships with the binary; panels fall back to
    // demo mode while still exercising real capture hardware.
    let loader = ModelLoader::new(Arc::new(NullRuntime));

    match args.panel.as_str() {
        "image" => run_image_panel(&args, &config, &loader).await,
        "audio" => run_audio_panel(&args, &config, &loader).await,
        "pose" => run_pose_panel(&args, &config, &loader).await,
        other => Err(anyhow!("unknown panel '{}', expected image|audio|pose", other)),
    }
}

/// Cancels the panel controls after the configured duration, or on
/// Ctrl-C when no duration was given.
fn spawn_stopper(controls: trikiosk::inference_loop::LoopControls, duration_secs: Option<u64>) {
    tokio::spawn(async move {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
            }
        }
        info!("Stopping panel");
        controls.cancel();
    });
}

async fn run_image_panel(args: &Args, config: &KioskConfig, loader: &ModelLoader) -> Result<()> {
    let camera = Box::new(CameraCapture::new(args.camera_device));
    let sink = LogSink::new("image");
    let mut panel = ImagePanel::activate(
        config.image.clone(),
        config.performance.clone(),
        loader,
        camera,
        sink,
    )
    .await?;

    if let Some(still) = &args.still {
        let image = image::open(still)?;
        info!("Classifying still image {}", still.display());
        panel.classify_still(&image).await;
        panel.deactivate();
        return Ok(());
    }

    spawn_stopper(panel.controls(), args.duration_secs);
    let outcome = panel.run().await;
    panel.deactivate();
    outcome
}

async fn run_audio_panel(args: &Args, config: &KioskConfig, loader: &ModelLoader) -> Result<()> {
    let microphone = Box::new(MicrophoneCapture::new());
    let sink = LogSink::new("audio");
    let mut panel = AudioPanel::activate(
        config.audio.clone(),
        config.performance.clone(),
        loader,
        microphone,
        sink,
    )
    .await?;

    if let Some(clip) = &args.clip {
        panel.play_clip(clip);
    }

    spawn_stopper(panel.controls(), args.duration_secs);
    let outcome = panel.run().await;
    panel.deactivate();
    outcome
}

async fn run_pose_panel(args: &Args, config: &KioskConfig, loader: &ModelLoader) -> Result<()> {
    let camera = Box::new(CameraCapture::new(args.camera_device));
    let sink = LogSink::new("pose");
    let mut panel = PosePanel::activate(
        config.pose.clone(),
        config.performance.clone(),
        loader,
        camera,
        sink,
    )
    .await?;

    spawn_stopper(panel.controls(), args.duration_secs);
    let outcome = panel.run().await;
    panel.deactivate();
    outcome
}
