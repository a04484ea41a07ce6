//! Session orchestration
//!
//! A `Session` owns everything the phases share: the browser control
//! channel, the playback-event dispatch, the synchronization gates the
//! phases park on, and the capture process manager. Phases install a
//! `PlaybackHandler` for their lifetime; events arriving with no handler
//! installed are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audiodev::AudioDeviceProvider;
use crate::browser::{
    BrowserControl, CallbackTable, Envelope, PlaybackEvent, PlaybackHandler, VideoMetadata,
};
use crate::capture::ProcessManager;
use crate::config::Config;
use crate::sync::Gate;

pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    config: Config,

    browser: Arc<dyn BrowserControl>,
    audio_provider: Arc<dyn AudioDeviceProvider>,
    manager: Arc<ProcessManager>,
    callbacks: Arc<CallbackTable>,

    /// Opened by the fullscreen handshake; the pipeline waits on it before
    /// the Analyze phase.
    init_gate: Arc<Gate>,
    /// Opened once playback is confirmed paused at exactly 0.0.
    ready_gate: Arc<Gate>,
    /// Opened when playback ends (or the session stops).
    done_gate: Arc<Gate>,

    handler: Mutex<Option<Arc<dyn PlaybackHandler>>>,
    metadata: Mutex<Option<VideoMetadata>>,

    fullscreen_entered: AtomicBool,
    ready_confirmed: AtomicBool,
    playback_ended: AtomicBool,
    stopped: AtomicBool,
}

impl Session {
    pub fn new(
        config: Config,
        browser: Arc<dyn BrowserControl>,
        audio_provider: Arc<dyn AudioDeviceProvider>,
    ) -> Self {
        Self::with_callbacks(config, browser, audio_provider, Arc::new(CallbackTable::new()))
    }

    /// Builds a session sharing a callback table with the browser transport,
    /// so acknowledgement envelopes dispatched here complete the transport's
    /// pending requests.
    pub fn with_callbacks(
        config: Config,
        browser: Arc<dyn BrowserControl>,
        audio_provider: Arc<dyn AudioDeviceProvider>,
        callbacks: Arc<CallbackTable>,
    ) -> Self {
        let manager = Arc::new(ProcessManager::new(config.stop_timeout()));
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            config,
            browser,
            audio_provider,
            manager,
            callbacks,
            init_gate: Arc::new(Gate::new()),
            ready_gate: Arc::new(Gate::new()),
            done_gate: Arc::new(Gate::new()),
            handler: Mutex::new(None),
            metadata: Mutex::new(None),
            fullscreen_entered: AtomicBool::new(false),
            ready_confirmed: AtomicBool::new(false),
            playback_ended: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        };
        info!("Created capture session {}", session.id);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn browser(&self) -> Arc<dyn BrowserControl> {
        Arc::clone(&self.browser)
    }

    pub fn audio_provider(&self) -> Arc<dyn AudioDeviceProvider> {
        Arc::clone(&self.audio_provider)
    }

    pub fn manager(&self) -> Arc<ProcessManager> {
        Arc::clone(&self.manager)
    }

    pub fn callbacks(&self) -> Arc<CallbackTable> {
        Arc::clone(&self.callbacks)
    }

    pub fn init_gate(&self) -> Arc<Gate> {
        Arc::clone(&self.init_gate)
    }

    pub fn ready_gate(&self) -> Arc<Gate> {
        Arc::clone(&self.ready_gate)
    }

    pub fn done_gate(&self) -> Arc<Gate> {
        Arc::clone(&self.done_gate)
    }

    pub fn metadata(&self) -> Option<VideoMetadata> {
        *self.metadata.lock().unwrap()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn has_playback_ended(&self) -> bool {
        self.playback_ended.load(Ordering::SeqCst)
    }

    /// Installs the playback handler for the active phase.
    pub fn set_handler(&self, handler: Arc<dyn PlaybackHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    fn handler(&self) -> Option<Arc<dyn PlaybackHandler>> {
        self.handler.lock().unwrap().clone()
    }

    /// Stops the session: opens every gate so nothing stays parked, and
    /// drops all pending browser callbacks.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping session {}", self.id);
        self.init_gate.open();
        self.ready_gate.open();
        self.done_gate.open();
        self.callbacks.clear();
    }

    /// Dispatches one line from the browser message channel.
    pub async fn dispatch_line(&self, line: &str) {
        if let Some(envelope) = Envelope::parse(line) {
            self.dispatch(&envelope).await;
        }
    }

    /// Dispatches one parsed envelope. Unknown events are dropped.
    pub async fn dispatch(&self, envelope: &Envelope) {
        if envelope.event == "ack" {
            if let Some(id) = envelope.request_id {
                self.callbacks.complete(id, envelope.payload.clone());
            }
            return;
        }

        let Some(event) = PlaybackEvent::from_envelope(envelope) else {
            return;
        };

        match event {
            PlaybackEvent::Metadata(metadata) => {
                if let Err(err) = self.handle_metadata(metadata).await {
                    warn!("Metadata handling failed: {:#}", err);
                }
            }
            PlaybackEvent::Fullscreen(entered) => self.handle_fullscreen(entered),
            PlaybackEvent::CanPlay(_) => {
                if let Err(err) = self.handle_canplay().await {
                    warn!("Readiness handshake failed: {:#}", err);
                    self.ready_gate
                        .fail(crate::error::CaptureError::Internal(format!("{err:#}")));
                }
            }
            PlaybackEvent::Update(data) => {
                if let Some(handler) = self.handler() {
                    handler.updated(&data);
                }
            }
            PlaybackEvent::Waiting(data) => {
                if let Some(handler) = self.handler() {
                    handler.waiting(&data);
                }
            }
            PlaybackEvent::Playing(data) => {
                if let Some(handler) = self.handler() {
                    handler.resumed(&data);
                }
            }
            PlaybackEvent::Ended(data) => {
                self.playback_ended.store(true, Ordering::SeqCst);
                if let Some(handler) = self.handler() {
                    handler.ended(&data);
                }
            }
        }
    }

    async fn handle_metadata(&self, metadata: VideoMetadata) -> Result<()> {
        debug!(
            "Video metadata: {}x{}, duration {:.3}s",
            metadata.width, metadata.height, metadata.duration
        );
        *self.metadata.lock().unwrap() = Some(metadata);

        // Autoplay policy requires a user gesture before playback commands
        // have any effect.
        self.browser
            .select_video()
            .await
            .context("failed to select video element")?;
        Ok(())
    }

    fn handle_fullscreen(&self, entered: bool) {
        if !entered {
            return;
        }
        // Ignore fullscreen noise until dimensions are known.
        if self.metadata().is_none() {
            debug!("Fullscreen before metadata, ignoring");
            return;
        }
        if self.fullscreen_entered.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Entered fullscreen, playback initialization complete");
        self.init_gate.open();
    }

    /// Readiness handshake: playback must be paused at exactly 0.0 before
    /// the Record phase may start the capture process.
    async fn handle_canplay(&self) -> Result<()> {
        if self.ready_confirmed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.browser.is_playing().await? {
            debug!("Playback running during readiness handshake, pausing");
            self.browser.pause().await?;
        }

        self.browser
            .set_time(0.0, true)
            .await
            .context("failed to force playback time to 0.0")?;

        debug!("Playback confirmed paused at 0.0");
        self.ready_gate.open();
        Ok(())
    }
}
