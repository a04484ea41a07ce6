use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::playback::BrowserControl;
use super::CallbackTable;

/// Browser transport over the process's standard streams.
///
/// Commands go out as one JSON object per line on stdout; the hosting
/// browser shim answers with `ack` envelopes on stdin, which the session
/// dispatch completes through the shared callback table.
pub struct StdioBrowser {
    writer: Mutex<tokio::io::Stdout>,
    callbacks: Arc<CallbackTable>,
}

impl StdioBrowser {
    pub fn new(callbacks: Arc<CallbackTable>) -> Self {
        Self {
            writer: Mutex::new(tokio::io::stdout()),
            callbacks,
        }
    }

    async fn send(&self, command: &str, args: Value) -> Result<Value> {
        let (id, rx) = self.callbacks.register();
        let message = json!({
            "command": command,
            "request_id": id,
            "args": args,
        });

        debug!("Browser command: {} (request {})", command, id);
        {
            let mut writer = self.writer.lock().await;
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await?;
        }

        // The sender is dropped when the session stops and clears the table;
        // treat that as a cancelled command.
        rx.await
            .with_context(|| format!("browser command {command} was never acknowledged"))
    }
}

#[async_trait::async_trait]
impl BrowserControl for StdioBrowser {
    async fn play(&self) -> Result<()> {
        self.send("play", Value::Null).await.map(|_| ())
    }

    async fn pause(&self) -> Result<()> {
        self.send("pause", Value::Null).await.map(|_| ())
    }

    async fn set_time(&self, time: f64, keep_paused: bool) -> Result<()> {
        self.send("time", json!({ "time": time, "keepPaused": keep_paused }))
            .await
            .map(|_| ())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.send("volume", json!({ "volume": volume })).await.map(|_| ())
    }

    async fn mute(&self) -> Result<()> {
        self.send("mute", Value::Null).await.map(|_| ())
    }

    async fn unmute(&self) -> Result<()> {
        self.send("unmute", Value::Null).await.map(|_| ())
    }

    async fn is_playing(&self) -> Result<bool> {
        let payload = self.send("isPlaying", Value::Null).await?;
        Ok(payload
            .get("playing")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn select_video(&self) -> Result<()> {
        self.send("selectVideo", Value::Null).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.send("close", Value::Null).await.map(|_| ())
    }
}
