pub mod analyze;
pub mod postprocess;
pub mod record;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::session::Session;
use crate::timing::cut::Cut;

pub use analyze::AnalyzePhase;
pub use postprocess::PostProcessPhase;
pub use record::{RecordHandler, RecordPhase};

/// Lifecycle states of a single phase.
///
/// `Stopped`, `Done` and `Error` are terminal; once a phase reaches one of
/// them no further transition is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    NotStarted,
    Running,
    Paused,
    Stopped,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Initialization,
    Analyze,
    Record,
    PostProcess,
}

/// Lifecycle notifications broadcast to observers (UI, logs, tests).
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    Begin(PhaseKind),
    Update { kind: PhaseKind, progress: f64 },
    End(PhaseKind),
    Error { kind: PhaseKind, message: String },
    Pause(PhaseKind),
    Resume(PhaseKind),
}

/// Shared state machine every phase embeds.
///
/// Transition methods return whether the transition happened, so callers can
/// skip side effects on no-op calls (resume on a non-paused phase, a second
/// stop).
#[derive(Debug)]
pub struct PhaseLifecycle {
    kind: PhaseKind,
    state: Mutex<PhaseState>,
    events: broadcast::Sender<PhaseEvent>,
}

impl PhaseLifecycle {
    pub fn new(kind: PhaseKind, events: broadcast::Sender<PhaseEvent>) -> Self {
        Self {
            kind,
            state: Mutex::new(PhaseState::NotStarted),
            events,
        }
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn state(&self) -> PhaseState {
        *self.state.lock().unwrap()
    }

    fn emit(&self, event: PhaseEvent) {
        let _ = self.events.send(event);
    }

    pub fn begin(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != PhaseState::NotStarted {
            return false;
        }
        *state = PhaseState::Running;
        drop(state);
        self.emit(PhaseEvent::Begin(self.kind));
        true
    }

    pub fn update(&self, progress: f64) {
        self.emit(PhaseEvent::Update {
            kind: self.kind,
            progress,
        });
    }

    /// Running -> Paused. Pausing a phase that is not running is a no-op.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != PhaseState::Running {
            return false;
        }
        *state = PhaseState::Paused;
        drop(state);
        self.emit(PhaseEvent::Pause(self.kind));
        true
    }

    /// Paused -> Running. Resuming a phase that is not paused is a no-op.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != PhaseState::Paused {
            return false;
        }
        *state = PhaseState::Running;
        drop(state);
        self.emit(PhaseEvent::Resume(self.kind));
        true
    }

    /// Any non-terminal state -> Stopped. A second stop is a no-op.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            PhaseState::Stopped | PhaseState::Done | PhaseState::Error => return false,
            _ => *state = PhaseState::Stopped,
        }
        drop(state);
        self.emit(PhaseEvent::End(self.kind));
        true
    }

    /// Running -> Done. Skipped when the phase was stopped underneath.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != PhaseState::Running && *state != PhaseState::Paused {
            return false;
        }
        *state = PhaseState::Done;
        drop(state);
        self.emit(PhaseEvent::End(self.kind));
        true
    }

    pub fn error(&self, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        if *state == PhaseState::Done || *state == PhaseState::Stopped {
            return;
        }
        *state = PhaseState::Error;
        drop(state);
        self.emit(PhaseEvent::Error {
            kind: self.kind,
            message: message.into(),
        });
    }
}

/// What a completed phase hands to the next one.
#[derive(Debug, Clone)]
pub enum PhaseOutput {
    Analyze(AnalyzeResult),
    Record(RecordInfo),
    PostProcess(PathBuf),
}

/// Resolved recording parameters produced by the Analyze phase (or derived
/// straight from configuration when detection is disabled).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzeResult {
    /// Total playback duration in seconds.
    pub duration: f64,
    /// Frame rate the capture process records at.
    pub record_frame_rate: f64,
    /// Frame rate of the final output; carries the measured playback rate
    /// when detection ran.
    pub output_frame_rate: f64,
    pub sample_rate: u32,
}

/// Everything PostProcess needs to reconstruct clean timing from the raw
/// recording.
#[derive(Debug, Clone)]
pub struct RecordInfo {
    /// Path of the raw recording.
    pub path: PathBuf,
    /// Dead-time windows to cut from the video stream, ascending by start.
    pub video_cuts: Vec<Cut>,
    /// Dead-time windows to cut from the audio stream, ascending by start.
    pub audio_cuts: Vec<Cut>,
    pub frame_rate: f64,
    pub sample_rate: u32,
    /// Constant audio offset applied at the final merge, in seconds.
    pub audio_offset: f64,
    /// Pre-roll/post-roll boundary: everything before `cut_off.start` and
    /// after `cut_off.end` is discarded.
    pub cut_off: Cut,
}

/// A pipeline phase: one long-running `run` plus externally driven
/// pause/resume/stop.
///
/// `run` returning `Ok(None)` means the phase was cancelled; the pipeline
/// short-circuits without treating it as a failure.
#[async_trait]
pub trait Phase: Send + Sync {
    fn kind(&self) -> PhaseKind;
    fn state(&self) -> PhaseState;
    async fn run(&self) -> Result<Option<PhaseOutput>>;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Drives the fixed phase order Initialization -> Analyze -> Record ->
/// PostProcess, handing each phase's output to the next.
pub struct Pipeline {
    session: Arc<Session>,
    events: broadcast::Sender<PhaseEvent>,
    current: Mutex<Option<Arc<dyn Phase>>>,
}

impl Pipeline {
    pub fn new(session: Arc<Session>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            session,
            events,
            current: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PhaseEvent> {
        self.events.subscribe()
    }

    fn set_current(&self, phase: Arc<dyn Phase>) {
        *self.current.lock().unwrap() = Some(phase);
    }

    fn current(&self) -> Option<Arc<dyn Phase>> {
        self.current.lock().unwrap().clone()
    }

    async fn run_phase(&self, phase: Arc<dyn Phase>) -> Result<Option<PhaseOutput>> {
        self.set_current(Arc::clone(&phase));
        match phase.run().await {
            Ok(output) => Ok(output),
            Err(err) => {
                error!("{:?} phase failed: {:#}", phase.kind(), err);
                Err(err)
            }
        }
    }

    /// Runs the whole pipeline. Returns the final output path, or `None`
    /// when any phase was cancelled.
    pub async fn run(&self) -> Result<Option<PathBuf>> {
        let _ = self.events.send(PhaseEvent::Begin(PhaseKind::Initialization));
        info!("Waiting for playback initialization");
        self.session.init_gate().wait().await?;
        let _ = self.events.send(PhaseEvent::End(PhaseKind::Initialization));

        if self.session.is_stopped() {
            return Ok(None);
        }

        let analyze = Arc::new(AnalyzePhase::new(
            Arc::clone(&self.session),
            self.events.clone(),
        ));
        let analyze_result = match self.run_phase(analyze).await? {
            Some(PhaseOutput::Analyze(result)) => result,
            _ => return Ok(None),
        };
        info!(
            "Analyze done: duration={:.3}s record_fps={:.3} output_fps={:.3}",
            analyze_result.duration,
            analyze_result.record_frame_rate,
            analyze_result.output_frame_rate
        );

        let record = Arc::new(RecordPhase::new(
            Arc::clone(&self.session),
            analyze_result,
            self.events.clone(),
        ));
        let record_info = match self.run_phase(record).await? {
            Some(PhaseOutput::Record(info)) => info,
            _ => return Ok(None),
        };
        info!(
            "Record done: {} video cuts, {} audio cuts, cut off [{:.3}, {:.3}]",
            record_info.video_cuts.len(),
            record_info.audio_cuts.len(),
            record_info.cut_off.start,
            record_info.cut_off.end
        );

        let postprocess = Arc::new(PostProcessPhase::new(
            Arc::clone(&self.session),
            record_info,
            self.events.clone(),
        ));
        match self.run_phase(postprocess).await? {
            Some(PhaseOutput::PostProcess(output)) => {
                info!("Pipeline finished: {}", output.display());
                Ok(Some(output))
            }
            _ => Ok(None),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        if let Some(phase) = self.current() {
            phase.pause().await?;
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        if let Some(phase) = self.current() {
            phase.resume().await?;
        }
        Ok(())
    }

    /// Stops the active phase and unblocks everything parked in the
    /// session's gates.
    pub async fn stop(&self) -> Result<()> {
        self.session.stop();
        if let Some(phase) = self.current() {
            phase.stop().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> PhaseLifecycle {
        let (events, _) = broadcast::channel(16);
        PhaseLifecycle::new(PhaseKind::Record, events)
    }

    #[test]
    fn test_resume_on_non_paused_is_noop() {
        let phase = lifecycle();
        phase.begin();
        assert!(!phase.resume());
        assert_eq!(phase.state(), PhaseState::Running);
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let phase = lifecycle();
        phase.begin();
        assert!(phase.pause());
        assert_eq!(phase.state(), PhaseState::Paused);
        assert!(phase.resume());
        assert_eq!(phase.state(), PhaseState::Running);
    }

    #[test]
    fn test_double_stop_is_noop() {
        let phase = lifecycle();
        phase.begin();
        assert!(phase.stop());
        assert!(!phase.stop());
        assert_eq!(phase.state(), PhaseState::Stopped);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let phase = lifecycle();
        phase.begin();
        phase.finish();
        assert!(!phase.stop());
        assert!(!phase.pause());
        assert!(!phase.begin());
        assert_eq!(phase.state(), PhaseState::Done);
    }

    #[test]
    fn test_stop_while_paused_releases_once() {
        let phase = lifecycle();
        phase.begin();
        assert!(phase.pause());
        assert!(phase.stop());
        assert!(!phase.stop());
        assert_eq!(phase.state(), PhaseState::Stopped);
    }

    #[test]
    fn test_error_is_terminal() {
        let (events, mut rx) = broadcast::channel(16);
        let phase = PhaseLifecycle::new(PhaseKind::Record, events);
        phase.begin();
        phase.error("capture process exited with code 1");
        assert_eq!(phase.state(), PhaseState::Error);
        assert!(!phase.stop());
        assert!(!phase.finish());

        assert_eq!(rx.try_recv().unwrap(), PhaseEvent::Begin(PhaseKind::Record));
        assert_eq!(
            rx.try_recv().unwrap(),
            PhaseEvent::Error {
                kind: PhaseKind::Record,
                message: "capture process exited with code 1".to_string()
            }
        );
    }

    #[test]
    fn test_finish_after_stop_is_noop() {
        let phase = lifecycle();
        phase.begin();
        phase.stop();
        assert!(!phase.finish());
        assert_eq!(phase.state(), PhaseState::Stopped);
    }

    #[test]
    fn test_events_are_broadcast() {
        let (events, mut rx) = broadcast::channel(16);
        let phase = PhaseLifecycle::new(PhaseKind::Analyze, events);
        phase.begin();
        phase.update(0.5);
        phase.finish();
        assert_eq!(rx.try_recv().unwrap(), PhaseEvent::Begin(PhaseKind::Analyze));
        assert_eq!(
            rx.try_recv().unwrap(),
            PhaseEvent::Update {
                kind: PhaseKind::Analyze,
                progress: 0.5
            }
        );
        assert_eq!(rx.try_recv().unwrap(), PhaseEvent::End(PhaseKind::Analyze));
    }
}
