use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::capture::CommandFactory;
use crate::postprocess::{
    delete_intermediate, run_transcode, Artifacts, AudioProcessor, VideoProcessor,
};
use crate::session::Session;

use super::{
    Phase, PhaseEvent, PhaseKind, PhaseLifecycle, PhaseOutput, PhaseState, RecordInfo,
};

/// Final phase: turns the raw recording into the configured output file.
///
/// The browser is closed first; nothing downstream needs it and freeing the
/// window keeps the trim/merge passes from competing with it.
pub struct PostProcessPhase {
    session: Arc<Session>,
    info: RecordInfo,
    lifecycle: Arc<PhaseLifecycle>,
}

impl PostProcessPhase {
    pub fn new(
        session: Arc<Session>,
        info: RecordInfo,
        events: broadcast::Sender<PhaseEvent>,
    ) -> Self {
        Self {
            session,
            info,
            lifecycle: Arc::new(PhaseLifecycle::new(PhaseKind::PostProcess, events)),
        }
    }

    async fn run_inner(&self) -> Result<Option<PhaseOutput>> {
        self.lifecycle.begin();

        let config = self.session.config().clone();
        let manager = self.session.manager();
        let factory = CommandFactory::new(config.quality);
        let artifacts = Artifacts::for_output(&config.output, config.quality);

        if let Err(err) = self.session.browser().close().await {
            warn!("Failed to close browser: {:#}", err);
        }

        let duration = self.info.cut_off.end.max(0.0);
        let progress = self.progress_sink(duration);

        let video = VideoProcessor::new(
            Arc::clone(&manager),
            factory.clone(),
            config.keep_temporary_files,
            Arc::clone(&progress),
        );
        video.process(&self.info, &artifacts.video).await?;
        if manager.is_stopped() || self.session.is_stopped() {
            self.lifecycle.stop();
            return Ok(None);
        }

        let audio = AudioProcessor::new(
            Arc::clone(&manager),
            factory.clone(),
            config.keep_temporary_files,
            Arc::clone(&progress),
        );
        audio.process(&self.info, &artifacts.audio).await?;
        if manager.is_stopped() || self.session.is_stopped() {
            self.lifecycle.stop();
            return Ok(None);
        }

        info!("Merging trimmed streams into {}", config.output.display());
        let merge = factory.merge_args(
            &artifacts.video,
            &artifacts.audio,
            self.info.audio_offset,
            &config.output,
        );
        run_transcode(&manager, &merge, progress).await?;
        if manager.is_stopped() || self.session.is_stopped() {
            self.lifecycle.stop();
            return Ok(None);
        }

        if !config.keep_temporary_files {
            debug!("Deleting intermediate artifacts");
            if artifacts.raw != config.output {
                delete_intermediate(&artifacts.raw).await;
            }
            delete_intermediate(&artifacts.video).await;
            delete_intermediate(&artifacts.audio).await;
        }

        self.lifecycle.finish();
        Ok(Some(PhaseOutput::PostProcess(config.output)))
    }

    fn progress_sink(&self, duration: f64) -> crate::postprocess::ProgressSink {
        let lifecycle = Arc::clone(&self.lifecycle);
        Arc::new(move |time: f64| {
            if duration > 0.0 {
                lifecycle.update((time / duration).clamp(0.0, 1.0));
            }
        })
    }
}

#[async_trait]
impl Phase for PostProcessPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::PostProcess
    }

    fn state(&self) -> PhaseState {
        self.lifecycle.state()
    }

    async fn run(&self) -> Result<Option<PhaseOutput>> {
        match self.run_inner().await {
            Ok(output) => Ok(output),
            Err(err) => {
                self.lifecycle.error(format!("{err:#}"));
                if let Err(stop_err) = self.session.manager().stop().await {
                    debug!("Transcoder stop during error cleanup failed: {:#}", stop_err);
                }
                Err(err)
            }
        }
    }

    async fn pause(&self) -> Result<()> {
        if !self.lifecycle.pause() {
            return Ok(());
        }
        self.session.manager().pause()
    }

    async fn resume(&self) -> Result<()> {
        if !self.lifecycle.resume() {
            return Ok(());
        }
        self.session.manager().resume()
    }

    async fn stop(&self) -> Result<()> {
        if !self.lifecycle.stop() {
            return Ok(());
        }
        self.session.manager().stop().await
    }
}
