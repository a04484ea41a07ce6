use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::capture::{probe, CommandFactory, ProcessManager};
use crate::phase::RecordInfo;
use crate::timing::cut::include_list;
use crate::trim::TrimCommandGenerator;

use super::{
    delete_intermediate, demux_path, exclusion_with_cut_off, run_transcode, ProgressSink,
};

/// Audio counterpart of [`super::VideoProcessor`]: same demux/trim flow on
/// the sample grid instead of the frame grid.
pub struct AudioProcessor {
    manager: Arc<ProcessManager>,
    factory: CommandFactory,
    keep_temporary_files: bool,
    progress: ProgressSink,
}

impl AudioProcessor {
    pub fn new(
        manager: Arc<ProcessManager>,
        factory: CommandFactory,
        keep_temporary_files: bool,
        progress: ProgressSink,
    ) -> Self {
        Self {
            manager,
            factory,
            keep_temporary_files,
            progress,
        }
    }

    pub async fn process(&self, info: &RecordInfo, output: &Path) -> Result<()> {
        debug!("Processing audio stream of {}", info.path.display());
        let demuxed = demux_path(output);

        let args = self.factory.demux_audio_args(&info.path, &demuxed);
        run_transcode(&self.manager, &args, Arc::clone(&self.progress)).await?;
        if self.manager.is_stopped() {
            return Ok(());
        }

        let duration = probe::probe_duration(&demuxed)
            .await
            .context("failed to probe demuxed audio duration")?;
        debug!("Audio duration: {:.6}s", duration);

        let exclusion = exclusion_with_cut_off(&info.audio_cuts, &info.cut_off, duration);
        let include = include_list(&exclusion, duration);

        let generator = TrimCommandGenerator::for_audio(
            &demuxed,
            output,
            info.sample_rate,
            self.factory.audio_trim_args(),
        );

        for command in generator.commands(&include)? {
            if self.manager.is_stopped() {
                return Ok(());
            }
            run_transcode(&self.manager, &command, Arc::clone(&self.progress)).await?;
        }

        if !self.keep_temporary_files {
            delete_intermediate(&demuxed).await;
            for partial in generator.partial_outputs(&include) {
                delete_intermediate(&partial).await;
            }
        }

        Ok(())
    }
}
