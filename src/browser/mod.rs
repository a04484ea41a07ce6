pub mod playback;
pub mod stdio;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

pub use playback::{BrowserControl, PlaybackData, PlaybackHandler};
pub use stdio::StdioBrowser;

/// Typed message envelope posted by the browser environment.
///
/// One JSON object per line on the message channel. Unknown or malformed
/// messages are ignored, never errors; the browser side cannot be trusted
/// to stay in sync with the native side's lifecycle.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Parses one line of the message channel. Returns `None` for anything
    /// that is not a well-formed envelope.
    pub fn parse(line: &str) -> Option<Envelope> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                debug!("Ignoring malformed bridge message: {}", err);
                None
            }
        }
    }
}

/// Video metadata reported once dimensions and duration become known.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// Recognized playback synchronization events.
///
/// `bufferPlay` and `playing` both signal a resume and map to
/// [`PlaybackEvent::Playing`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Metadata(VideoMetadata),
    Fullscreen(bool),
    CanPlay(PlaybackData),
    Update(PlaybackData),
    Waiting(PlaybackData),
    Playing(PlaybackData),
    Ended(PlaybackData),
}

impl PlaybackEvent {
    /// Maps an envelope to a recognized event. Unrecognized event names and
    /// undecodable payloads yield `None` and are dropped by the caller.
    pub fn from_envelope(envelope: &Envelope) -> Option<PlaybackEvent> {
        let payload = &envelope.payload;
        match envelope.event.as_str() {
            "metadata" => serde_json::from_value(payload.clone())
                .ok()
                .map(PlaybackEvent::Metadata),
            "fullscreen" => payload.as_bool().map(PlaybackEvent::Fullscreen),
            "canplay" => Self::data(payload).map(PlaybackEvent::CanPlay),
            "update" => Self::data(payload).map(PlaybackEvent::Update),
            "waiting" => Self::data(payload).map(PlaybackEvent::Waiting),
            "playing" | "bufferPlay" => Self::data(payload).map(PlaybackEvent::Playing),
            "ended" => Self::data(payload).map(PlaybackEvent::Ended),
            _ => None,
        }
    }

    fn data(payload: &Value) -> Option<PlaybackData> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Callback table keyed by request id.
///
/// The native side acknowledges browser commands through this table instead
/// of any composite string keys: a command registers a slot, sends its
/// request id to the browser, and the dispatcher completes the slot when an
/// `ack` envelope with the same id arrives.
#[derive(Debug, Default)]
pub struct CallbackTable {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a request id and its completion slot.
    pub fn register(&self) -> (u64, oneshot::Receiver<Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    /// Completes a pending request. Unknown ids are ignored (the waiter may
    /// have been dropped by a stopped phase).
    pub fn complete(&self, id: u64, value: Value) {
        if let Some(tx) = self.pending.lock().unwrap().remove(&id) {
            let _ = tx.send(value);
        }
    }

    /// Drops every pending slot, waking all waiters with a closed channel.
    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event: &str, payload: Value) -> Envelope {
        Envelope {
            event: event.to_string(),
            request_id: None,
            payload,
        }
    }

    #[test]
    fn test_parse_valid_envelope() {
        let line = r#"{"event":"update","request_id":7,"payload":{"time":1.5,"frame":36,"buffered":4.0,"now":1000}}"#;
        let envelope = Envelope::parse(line).unwrap();
        assert_eq!(envelope.event, "update");
        assert_eq!(envelope.request_id, Some(7));
    }

    #[test]
    fn test_parse_malformed_line_is_ignored() {
        assert!(Envelope::parse("not json").is_none());
        assert!(Envelope::parse("").is_none());
        assert!(Envelope::parse("[1,2,3]").is_none());
    }

    #[test]
    fn test_unknown_event_name_is_ignored() {
        let env = envelope("somethingelse", json!({"time": 0.0, "frame": 0}));
        assert!(PlaybackEvent::from_envelope(&env).is_none());
    }

    #[test]
    fn test_metadata_event() {
        let env = envelope("metadata", json!({"width": 640, "height": 360, "duration": 10.0}));
        let event = PlaybackEvent::from_envelope(&env).unwrap();
        assert_eq!(
            event,
            PlaybackEvent::Metadata(VideoMetadata {
                width: 640,
                height: 360,
                duration: 10.0
            })
        );
    }

    #[test]
    fn test_buffer_play_maps_to_playing() {
        let payload = json!({"time": 2.5, "frame": 60, "buffered": 5.0, "now": 2500});
        let event = PlaybackEvent::from_envelope(&envelope("bufferPlay", payload)).unwrap();
        assert!(matches!(event, PlaybackEvent::Playing(_)));
    }

    #[tokio::test]
    async fn test_callback_table_round_trip() {
        let table = CallbackTable::new();
        let (id, rx) = table.register();
        table.complete(id, json!({"ok": true}));
        let value = rx.await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_callback_table_unknown_id_ignored() {
        let table = CallbackTable::new();
        table.complete(999, json!(null));
    }
}
