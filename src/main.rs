use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use drm_capture::audiodev::{AudioDeviceProvider, ConfiguredDevice, DeviceListParser};
use drm_capture::browser::CallbackTable;
use drm_capture::{Config, Pipeline, Quality, Session, StdioBrowser};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "drm-capture", about = "DRM playback capture pipeline")]
struct Cli {
    /// Configuration file (without extension).
    #[arg(short, long, default_value = "config/drm-capture")]
    config: String,

    /// Output file, overriding the configured one.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Title of the browser window to capture.
    #[arg(long)]
    window_title: Option<String>,

    /// Explicit audio capture device name.
    #[arg(long)]
    audio_device: Option<String>,

    #[arg(long, value_enum)]
    quality: Option<Quality>,

    /// Keep demuxed/trimmed intermediates after a successful merge.
    #[arg(long)]
    keep_temporary_files: bool,
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(title) = &cli.window_title {
        config.window_title = title.clone();
    }
    if let Some(device) = &cli.audio_device {
        config.audio_device = Some(device.clone());
    }
    if let Some(quality) = cli.quality {
        config.quality = quality;
    }
    if cli.keep_temporary_files {
        config.keep_temporary_files = true;
    }
    config
}

/// Enumerates loopback devices by asking the transcoder for its device list.
struct TranscoderDevices;

#[async_trait::async_trait]
impl AudioDeviceProvider for TranscoderDevices {
    async fn devices(
        &self,
    ) -> std::result::Result<Vec<drm_capture::audiodev::AudioDevice>, drm_capture::CaptureError>
    {
        let output = tokio::process::Command::new("ffmpeg")
            .args(["-f", "dshow", "-list_devices", "true", "-i", "dummy", "-hide_banner"])
            .output()
            .await
            .map_err(|err| drm_capture::CaptureError::Internal(err.to_string()))?;

        let mut parser = DeviceListParser::new();
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            parser.feed(line);
        }
        Ok(parser.into_devices())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the browser command channel; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = apply_overrides(Config::load(&cli.config)?, &cli);
    info!("Capturing to {}", config.output.display());

    let callbacks = Arc::new(CallbackTable::new());
    let browser = Arc::new(StdioBrowser::new(Arc::clone(&callbacks)));

    let audio_provider: Arc<dyn AudioDeviceProvider> = match &config.audio_device {
        Some(name) => Arc::new(ConfiguredDevice::new(name.clone())),
        None => Arc::new(TranscoderDevices),
    };

    let session = Arc::new(Session::with_callbacks(
        config,
        browser,
        audio_provider,
        callbacks,
    ));
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&session)));

    // Browser events arrive as JSON lines on stdin.
    {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                session.dispatch_line(&line).await;
            }
            // The browser side went away; nothing can make progress.
            session.stop();
        });
    }

    {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping pipeline");
                if let Err(err) = pipeline.stop().await {
                    warn!("Stop failed: {:#}", err);
                }
            }
        });
    }

    match pipeline.run().await? {
        Some(output) => {
            info!("Done: {}", output.display());
        }
        None => {
            info!("Cancelled");
        }
    }

    Ok(())
}
