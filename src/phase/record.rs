use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::browser::{PlaybackData, PlaybackHandler};
use crate::capture::{CommandFactory, ProgressParser};
use crate::error::CaptureError;
use crate::postprocess::Artifacts;
use crate::session::Session;
use crate::sync::Gate;
use crate::timing::cut::Cut;
use crate::timing::metrics::RecordMetrics;

use super::{
    AnalyzeResult, Phase, PhaseEvent, PhaseKind, PhaseLifecycle, PhaseOutput, PhaseState,
    RecordInfo,
};

#[derive(Debug, Default)]
struct Windows {
    video_cuts: Vec<Cut>,
    audio_cuts: Vec<Cut>,
    /// Record time at which the current dead-time window opened, if one is
    /// open.
    pause_time: Option<f64>,
    /// Record time of the first playback event; everything before it is
    /// pre-roll.
    start_cut_off: Option<f64>,
    end_cut_off: f64,
    ended: bool,
}

/// Translates playback events into dead-time cuts on the record timeline.
///
/// All timestamps are record times: the capture process's own clock,
/// interpolated between its progress reports. The `_at` variants take an
/// explicit instant so the mapping is testable without real sleeps.
pub struct RecordHandler {
    metrics: Mutex<RecordMetrics>,
    windows: Mutex<Windows>,
    recording: AtomicBool,
    done: Arc<Gate>,
}

impl RecordHandler {
    pub fn new(done: Arc<Gate>) -> Self {
        Self {
            metrics: Mutex::new(RecordMetrics::new()),
            windows: Mutex::new(Windows::default()),
            recording: AtomicBool::new(false),
            done,
        }
    }

    /// Marks the capture process as confirmed running. Events arriving
    /// before this are ignored; nothing is on disk yet to cut.
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Feeds one progress report from the capture process.
    pub fn record_progress_at(&self, time: f64, now: Instant) {
        self.metrics.lock().unwrap().update_record_at(time, now);
    }

    pub fn record_time_at(&self, now: Instant) -> f64 {
        self.metrics.lock().unwrap().record_time_at(now)
    }

    pub fn updated_at(&self, data: &PlaybackData, now: Instant) {
        if !self.is_recording() {
            return;
        }
        let record_time = self.record_time_at(now);
        self.metrics.lock().unwrap().update_playback(data.time, data.frame);

        let mut windows = self.windows.lock().unwrap();
        if windows.start_cut_off.is_none() {
            debug!("Start cut off: {:.6}", record_time);
            windows.start_cut_off = Some(record_time);
        }
        trace!(
            "Update | time={:.3} frame={} record_time={:.3}",
            data.time,
            data.frame,
            record_time
        );
    }

    pub fn waiting_at(&self, data: &PlaybackData, now: Instant) {
        if !self.is_recording() {
            return;
        }
        let record_time = self.record_time_at(now);
        self.metrics.lock().unwrap().update_playback(data.time, data.frame);

        let mut windows = self.windows.lock().unwrap();
        if windows.ended {
            return;
        }
        if windows.start_cut_off.is_none() {
            windows.start_cut_off = Some(record_time);
        }
        if windows.pause_time.is_none() {
            debug!("Dead time opens at record time {:.6}", record_time);
            windows.pause_time = Some(record_time);
        }
    }

    pub fn resumed_at(&self, data: &PlaybackData, now: Instant) {
        if !self.is_recording() {
            return;
        }
        let record_time = self.record_time_at(now);
        self.metrics.lock().unwrap().update_playback(data.time, data.frame);

        let mut windows = self.windows.lock().unwrap();
        if windows.start_cut_off.is_none() {
            windows.start_cut_off = Some(record_time);
        }
        if let Some(start) = windows.pause_time.take() {
            let cut = Cut::new(start, record_time);
            debug!("Dead time closes: cut [{:.6}, {:.6}]", cut.start, cut.end);
            windows.video_cuts.push(cut);
            windows.audio_cuts.push(cut);
        }
    }

    pub fn ended_at(&self, data: &PlaybackData, now: Instant) {
        if !self.is_recording() {
            return;
        }
        let record_time = self.record_time_at(now);
        self.metrics.lock().unwrap().update_playback(data.time, data.frame);

        let mut windows = self.windows.lock().unwrap();
        if windows.ended {
            return;
        }
        windows.ended = true;

        // Ending while stalled means the open pause point is the true end
        // of usable content.
        windows.end_cut_off = windows.pause_time.take().unwrap_or(record_time);
        debug!("End cut off: {:.6}", windows.end_cut_off);
        drop(windows);

        self.done.open();
    }

    /// Assembles the result once recording is finished. Cuts come out in
    /// ascending start order regardless of arrival order.
    pub fn record_info(
        &self,
        path: std::path::PathBuf,
        frame_rate: f64,
        sample_rate: u32,
        audio_offset: f64,
    ) -> RecordInfo {
        let mut windows = self.windows.lock().unwrap();
        windows.video_cuts.sort_by(|a, b| a.start.total_cmp(&b.start));
        windows.audio_cuts.sort_by(|a, b| a.start.total_cmp(&b.start));
        RecordInfo {
            path,
            video_cuts: windows.video_cuts.clone(),
            audio_cuts: windows.audio_cuts.clone(),
            frame_rate,
            sample_rate,
            audio_offset,
            cut_off: Cut::new(windows.start_cut_off.unwrap_or(0.0), windows.end_cut_off),
        }
    }
}

impl PlaybackHandler for RecordHandler {
    fn updated(&self, data: &PlaybackData) {
        self.updated_at(data, Instant::now());
    }

    fn waiting(&self, data: &PlaybackData) {
        self.waiting_at(data, Instant::now());
    }

    fn resumed(&self, data: &PlaybackData) {
        self.resumed_at(data, Instant::now());
    }

    fn ended(&self, data: &PlaybackData) {
        self.ended_at(data, Instant::now());
    }
}

/// Runs the actual capture: spawns the recording process, drives playback
/// from its confirmed start, and collects the timing reconstruction data.
pub struct RecordPhase {
    session: Arc<Session>,
    params: AnalyzeResult,
    lifecycle: PhaseLifecycle,
    handler: Arc<RecordHandler>,
    /// Opened by the first progress line from the capture process.
    start_gate: Arc<Gate>,
}

impl RecordPhase {
    pub fn new(
        session: Arc<Session>,
        params: AnalyzeResult,
        events: broadcast::Sender<PhaseEvent>,
    ) -> Self {
        let handler = Arc::new(RecordHandler::new(session.done_gate()));
        Self {
            session,
            params,
            lifecycle: PhaseLifecycle::new(PhaseKind::Record, events),
            handler,
            start_gate: Arc::new(Gate::new()),
        }
    }

    async fn run_inner(&self) -> Result<Option<PhaseOutput>> {
        self.lifecycle.begin();

        let config = self.session.config().clone();
        let browser = self.session.browser();
        let manager = self.session.manager();
        let artifacts = Artifacts::for_output(&config.output, config.quality);

        // Playback must already be parked at 0.0.
        self.session.ready_gate().wait().await?;
        if self.session.is_stopped() {
            self.lifecycle.stop();
            return Ok(None);
        }

        debug!("Preparing audio for capture");
        browser.unmute().await?;
        browser.set_volume(1.0).await?;

        self.spawn_capture(&artifacts.raw).await?;

        // The capture process only counts as started once it reports
        // progress; an exit before that is a startup failure no matter the
        // code.
        debug!("Waiting for capture startup confirmation");
        tokio::select! {
            result = self.start_gate.wait() => {
                result?;
            }
            code = manager.wait() => {
                let code = code?;
                return Err(CaptureError::ProcessStartup { code }.into());
            }
        }

        info!("Capture confirmed, starting playback");
        self.handler.set_recording(true);
        self.session
            .set_handler(Arc::clone(&self.handler) as Arc<dyn PlaybackHandler>);
        browser.play().await?;

        self.session.done_gate().wait().await?;
        self.session.clear_handler();

        if self.session.is_stopped() && !self.session.has_playback_ended() {
            manager.stop().await?;
            self.lifecycle.stop();
            return Ok(None);
        }

        debug!("Playback ended, stopping capture gracefully");
        manager.stop().await?;

        let info = self.handler.record_info(
            artifacts.raw,
            self.params.output_frame_rate,
            self.params.sample_rate,
            config.audio_offset,
        );
        self.lifecycle.finish();
        Ok(Some(PhaseOutput::Record(info)))
    }

    async fn spawn_capture(&self, raw_path: &std::path::Path) -> Result<()> {
        let config = self.session.config();
        let device = crate::audiodev::resolve(self.session.audio_provider().as_ref()).await?;

        let factory = CommandFactory::new(config.quality);
        let args = factory.record_args(
            &device.name,
            self.params.record_frame_rate,
            self.params.sample_rate,
            &config.window_title,
            raw_path,
        );

        let parser = ProgressParser::new();
        let handler = Arc::clone(&self.handler);
        let start_gate = Arc::clone(&self.start_gate);
        self.session
            .manager()
            .spawn("ffmpeg", &args, move |line| {
                if let Some(progress) = parser.parse(&line) {
                    start_gate.open();
                    handler.record_progress_at(progress.time, Instant::now());
                } else {
                    trace!("ffmpeg | {}", line);
                }
            })
            .await
    }
}

#[async_trait]
impl Phase for RecordPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Record
    }

    fn state(&self) -> PhaseState {
        self.lifecycle.state()
    }

    async fn run(&self) -> Result<Option<PhaseOutput>> {
        match self.run_inner().await {
            Ok(output) => Ok(output),
            Err(err) => {
                self.lifecycle.error(format!("{err:#}"));
                self.session.clear_handler();
                self.start_gate.open();
                if let Err(stop_err) = self.session.manager().stop().await {
                    debug!("Capture stop during error cleanup failed: {:#}", stop_err);
                }
                self.session.done_gate().open();
                Err(err)
            }
        }
    }

    async fn pause(&self) -> Result<()> {
        if !self.lifecycle.pause() {
            return Ok(());
        }
        self.session.browser().pause().await?;
        self.session.manager().pause()?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if !self.lifecycle.resume() {
            return Ok(());
        }
        self.session.browser().play().await?;
        self.session.manager().resume()?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.lifecycle.stop() {
            return Ok(());
        }
        self.start_gate.open();
        self.session.manager().stop().await?;
        self.session.done_gate().open();
        Ok(())
    }
}
