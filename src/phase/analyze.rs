use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::browser::{BrowserControl, PlaybackData, PlaybackHandler};
use crate::error::CaptureError;
use crate::session::Session;
use crate::sync::Gate;
use crate::timing::metrics::RecordMetrics;

use super::{
    AnalyzeResult, Phase, PhaseEvent, PhaseKind, PhaseLifecycle, PhaseOutput, PhaseState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Priming,
    Measuring,
    Finished,
}

/// Two-pass frame-rate measurement.
///
/// The first pass only lets the player buffer ahead so the measurement pass
/// is not polluted by network stalls; once enough is buffered, playback is
/// rewound to 0 and the real measurement runs until the analyze window is
/// covered.
struct AnalyzeHandler {
    browser: Arc<dyn BrowserControl>,
    analyze_duration: f64,
    pass: Mutex<Pass>,
    metrics: Mutex<RecordMetrics>,
    done: Arc<Gate>,
}

impl AnalyzeHandler {
    fn new(browser: Arc<dyn BrowserControl>, analyze_duration: f64, done: Arc<Gate>) -> Self {
        Self {
            browser,
            analyze_duration,
            pass: Mutex::new(Pass::Priming),
            metrics: Mutex::new(RecordMetrics::new()),
            done,
        }
    }

    fn frame_rate(&self) -> f64 {
        self.metrics.lock().unwrap().playback_frame_rate()
    }
}

impl PlaybackHandler for AnalyzeHandler {
    fn updated(&self, data: &PlaybackData) {
        let mut pass = self.pass.lock().unwrap();
        match *pass {
            Pass::Priming => {
                if data.buffered >= self.analyze_duration || data.time >= self.analyze_duration {
                    debug!(
                        "Buffered {:.3}s, starting measurement pass",
                        data.buffered
                    );
                    *pass = Pass::Measuring;
                    self.metrics.lock().unwrap().reset();
                    let browser = Arc::clone(&self.browser);
                    tokio::spawn(async move {
                        if let Err(err) = browser.set_time(0.0, false).await {
                            warn!("Rewind for measurement failed: {:#}", err);
                        }
                    });
                }
            }
            Pass::Measuring => {
                self.metrics.lock().unwrap().update_playback(data.time, data.frame);
                if data.time >= self.analyze_duration {
                    *pass = Pass::Finished;
                    let browser = Arc::clone(&self.browser);
                    tokio::spawn(async move {
                        if let Err(err) = browser.pause().await {
                            warn!("Pause after measurement failed: {:#}", err);
                        }
                    });
                    self.done.open();
                }
            }
            Pass::Finished => {}
        }
    }

    fn waiting(&self, _data: &PlaybackData) {}

    fn resumed(&self, _data: &PlaybackData) {}

    fn ended(&self, _data: &PlaybackData) {
        // Video shorter than the analyze window; measure what we have.
        self.done.open();
    }
}

/// Measures the effective playback frame rate before any recording starts,
/// falling back to the configured rate when detection is disabled or the
/// measurement is unusable.
pub struct AnalyzePhase {
    session: Arc<Session>,
    lifecycle: PhaseLifecycle,
    done: Arc<Gate>,
}

impl AnalyzePhase {
    pub fn new(session: Arc<Session>, events: broadcast::Sender<PhaseEvent>) -> Self {
        Self {
            session,
            lifecycle: PhaseLifecycle::new(PhaseKind::Analyze, events),
            done: Arc::new(Gate::new()),
        }
    }

    async fn run_inner(&self) -> Result<Option<PhaseOutput>> {
        self.lifecycle.begin();

        let config = self.session.config().clone();
        let metadata = self
            .session
            .metadata()
            .ok_or_else(|| CaptureError::InvalidMedia("no video metadata".to_string()))?;

        // Playback must be confirmed paused at 0.0 either way.
        self.session.ready_gate().wait().await?;
        if self.session.is_stopped() {
            self.lifecycle.stop();
            return Ok(None);
        }

        if !config.detect_frame_rate {
            info!(
                "Frame-rate detection disabled, using configured {:.3} fps",
                config.output_frame_rate
            );
            self.lifecycle.finish();
            return Ok(Some(PhaseOutput::Analyze(
                self.result_from(metadata.duration, config.output_frame_rate),
            )));
        }

        let browser = self.session.browser();
        let handler = Arc::new(AnalyzeHandler::new(
            Arc::clone(&browser),
            config.analyze_duration,
            Arc::clone(&self.done),
        ));
        self.session
            .set_handler(Arc::clone(&handler) as Arc<dyn PlaybackHandler>);

        debug!("Starting analyze playback");
        browser.mute().await?;
        browser.play().await?;

        self.done.wait().await?;
        self.session.clear_handler();

        if self.session.is_stopped() {
            self.lifecycle.stop();
            return Ok(None);
        }

        // Back to the paused-at-zero baseline for the Record phase.
        browser.set_time(0.0, true).await?;

        // The measured rate becomes the output rate; it is what the trim
        // index conversion has to agree with. The capture rate stays
        // configuration-driven.
        let measured = handler.frame_rate();
        let output_frame_rate = if measured > 0.0 {
            measured
        } else {
            warn!(
                "Measurement inconclusive, falling back to {:.3} fps",
                config.output_frame_rate
            );
            config.output_frame_rate
        };
        info!("Measured playback frame rate: {:.3} fps", output_frame_rate);

        self.lifecycle.finish();
        Ok(Some(PhaseOutput::Analyze(
            self.result_from(metadata.duration, output_frame_rate),
        )))
    }

    fn result_from(&self, duration: f64, output_frame_rate: f64) -> AnalyzeResult {
        let config = self.session.config();
        AnalyzeResult {
            duration,
            record_frame_rate: config.record_frame_rate,
            output_frame_rate,
            sample_rate: config.sample_rate,
        }
    }
}

#[async_trait]
impl Phase for AnalyzePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Analyze
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
                self.done.open();
                Err(err)
            }
        }
    }

    async fn pause(&self) -> Result<()> {
        if !self.lifecycle.pause() {
            return Ok(());
        }
        self.session.browser().pause().await
    }

    async fn resume(&self) -> Result<()> {
        if !self.lifecycle.resume() {
            return Ok(());
        }
        self.session.browser().play().await
    }

    async fn stop(&self) -> Result<()> {
        if !self.lifecycle.stop() {
            return Ok(());
        }
        self.done.open();
        Ok(())
    }
}
