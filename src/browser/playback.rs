use anyhow::Result;
use serde::Deserialize;

/// One playback tick reported by the browser-hosted video element.
///
/// Immutable; a new instance is produced for every event.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PlaybackData {
    /// Current playback position in seconds.
    pub time: f64,
    /// Presented frame count (total minus dropped).
    pub frame: i64,
    /// End of the furthest buffered range, in seconds.
    #[serde(default)]
    pub buffered: f64,
    /// Browser-side timestamp in milliseconds, monotonic per session.
    #[serde(default)]
    pub now: u64,
}

/// Per-phase consumer of playback events.
///
/// Installed by the active phase; events arriving while no handler is
/// installed (phase stopped or errored) are silently dropped, since event
/// delivery cannot be cancelled at the source.
pub trait PlaybackHandler: Send + Sync {
    /// Periodic time update.
    fn updated(&self, data: &PlaybackData);
    /// Playback stalled (buffering or explicit pause); opens a dead-time
    /// window.
    fn waiting(&self, data: &PlaybackData);
    /// Playback resumed after a stall; closes the dead-time window.
    fn resumed(&self, data: &PlaybackData);
    /// Playback reached its logical end.
    fn ended(&self, data: &PlaybackData);
}

/// Commands the native side issues against the browser-hosted video
/// element. The embedding application provides the implementation; the
/// pipeline never blocks the browser's thread.
#[async_trait::async_trait]
pub trait BrowserControl: Send + Sync {
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    /// Seeks to `time`; with `keep_paused` the element stays paused even if
    /// it was playing before the seek.
    async fn set_time(&self, time: f64, keep_paused: bool) -> Result<()>;
    async fn set_volume(&self, volume: f64) -> Result<()>;
    async fn mute(&self) -> Result<()>;
    async fn unmute(&self) -> Result<()>;
    async fn is_playing(&self) -> Result<bool>;
    /// Synthetic user interaction selecting the video element, required by
    /// autoplay policy before any playback command works.
    async fn select_video(&self) -> Result<()>;
    /// Closes the browser window; recording no longer needs it.
    async fn close(&self) -> Result<()>;
}
