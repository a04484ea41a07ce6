use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Probes the exact duration of a media file in seconds.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .context("failed to run ffprobe")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe exited with code {} for {}",
            output.status.code().unwrap_or(-1),
            path.display()
        );
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let duration: f64 = text
        .trim()
        .parse()
        .with_context(|| format!("unparsable ffprobe duration: {:?}", text.trim()))?;

    debug!("Probed duration of {}: {:.6}s", path.display(), duration);
    Ok(duration)
}
