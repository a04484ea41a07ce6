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

/// Reconstructs a clean video stream from the raw recording: demux, trim
/// out the dead-time windows and the pre/post-roll, re-encode.
pub struct VideoProcessor {
    manager: Arc<ProcessManager>,
    factory: CommandFactory,
    keep_temporary_files: bool,
    progress: ProgressSink,
}

impl VideoProcessor {
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
        debug!("Processing video stream of {}", info.path.display());
        let demuxed = demux_path(output);

        let args = self.factory.demux_video_args(&info.path, &demuxed);
        run_transcode(&self.manager, &args, Arc::clone(&self.progress)).await?;
        if self.manager.is_stopped() {
            return Ok(());
        }

        let duration = probe::probe_duration(&demuxed)
            .await
            .context("failed to probe demuxed video duration")?;
        debug!("Video duration: {:.6}s", duration);

        let exclusion = exclusion_with_cut_off(&info.video_cuts, &info.cut_off, duration);
        let include = include_list(&exclusion, duration);

        let generator = TrimCommandGenerator::for_video(
            &demuxed,
            output,
            info.frame_rate,
            self.factory.video_trim_args(),
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
