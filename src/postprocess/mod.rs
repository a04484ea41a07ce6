//! Post-process stream processors
//!
//! Each stream of the raw recording is demuxed to its own file, trimmed
//! according to the reconstructed dead-time cuts, and handed to the final
//! merge. All intermediate artifacts are siblings of the output path, named
//! deterministically from its stem.

mod audio;
mod video;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};

use crate::capture::{CommandFactory, ProcessManager, Quality, TimeProgressParser};
use crate::error::CaptureError;
use crate::timing::approx_eq;
use crate::timing::cut::Cut;

pub use audio::AudioProcessor;
pub use video::VideoProcessor;

/// Receives trim/merge progress in output-stream seconds.
pub type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

/// Sibling artifact paths derived from the configured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// Raw recording produced by the capture process.
    pub raw: PathBuf,
    /// Trimmed video-only stream, input to the final merge.
    pub video: PathBuf,
    /// Trimmed audio-only stream, input to the final merge.
    pub audio: PathBuf,
}

impl Artifacts {
    pub fn for_output(output: &Path, quality: Quality) -> Self {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let factory = CommandFactory::new(quality);

        let mut raw = output.with_file_name(format!("{stem}.{}", factory.video_file_extension()));
        if raw == output {
            // The output itself is an .mkv; keep the raw recording apart.
            raw = output.with_file_name(format!("{stem}.record.{}", factory.video_file_extension()));
        }

        Self {
            raw,
            video: output.with_file_name(format!(
                "{stem}.video.{}",
                factory.video_file_extension()
            )),
            audio: output.with_file_name(format!(
                "{stem}.audio.{}",
                factory.audio_file_extension()
            )),
        }
    }
}

/// Demux target for a trim output: `movie.video.mkv` -> `movie.video.demux.mkv`.
fn demux_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = output
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{stem}.demux.{extension}"))
}

/// Full exclusion list for one stream: the recorded dead-time cuts plus the
/// pre-roll and post-roll windows from the cut-off boundary.
pub fn exclusion_with_cut_off(cuts: &[Cut], cut_off: &Cut, duration: f64) -> Vec<Cut> {
    let mut all = Vec::with_capacity(cuts.len() + 2);
    if cut_off.start > 0.0 && !approx_eq(cut_off.start, 0.0) {
        all.push(Cut::new(0.0, cut_off.start));
    }
    all.extend_from_slice(cuts);
    if cut_off.end > 0.0 && cut_off.end < duration && !approx_eq(cut_off.end, duration) {
        all.push(Cut::new(cut_off.end, duration));
    }
    all
}

/// Runs one transcoder invocation to completion, feeding time progress to
/// `progress`. A non-zero exit after an explicit stop is expected and not an
/// error.
pub(crate) async fn run_transcode(
    manager: &ProcessManager,
    args: &[String],
    progress: ProgressSink,
) -> Result<()> {
    let parser = TimeProgressParser::new();
    let code = manager
        .run_to_completion("ffmpeg", args, move |line| {
            if let Some(time) = parser.parse(&line) {
                progress(time);
            } else {
                trace!("ffmpeg | {}", line);
            }
        })
        .await
        .context("transcoder invocation failed")?;

    if manager.is_stopped() {
        return Ok(());
    }
    CaptureError::check_exit_code(code)?;
    Ok(())
}

/// Deletes an intermediate file; a missing file is fine.
pub(crate) async fn delete_intermediate(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted intermediate {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to delete {}: {}", path.display(), err),
    }
}
