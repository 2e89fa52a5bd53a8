//! Browser-backed collaborators.
//!
//! The browser owns the speech engine, the caption overlay and the camera.
//! These adapters turn collaborator calls into outbound [`ServerMessage`]s and
//! route the browser's speech lifecycle reports back to the waiting playback
//! task by utterance id.

use super::protocol::ServerMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use emote_core::capture::PhotoCapture;
use emote_core::playback::{SpeechEngine, SpeechEvent, TextDisplay};
use emote_core::snapshot::Region;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

pub struct WsSpeechEngine {
    outbound: Outbound,
    utterances: Mutex<HashMap<u64, mpsc::UnboundedSender<SpeechEvent>>>,
    next_id: AtomicU64,
    rate: f64,
    pitch: f64,
}

impl WsSpeechEngine {
    pub fn new(outbound: Outbound, rate: f64) -> Self {
        Self {
            outbound,
            utterances: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            rate,
            pitch: 1.0,
        }
    }

    /// Forwards a lifecycle report from the browser to the utterance's waiter.
    ///
    /// Reports for unknown or cancelled utterances are ignored.
    pub fn dispatch(&self, utterance_id: u64, event: SpeechEvent) {
        let Ok(mut utterances) = self.utterances.lock() else {
            return;
        };
        let finished = matches!(event, SpeechEvent::Ended | SpeechEvent::Failed(_));
        match utterances.get(&utterance_id) {
            Some(waiter) => {
                let _ = waiter.send(event);
            }
            None => debug!(utterance_id, "speech report for unknown utterance"),
        }
        if finished {
            utterances.remove(&utterance_id);
        }
    }
}

#[async_trait]
impl SpeechEngine for WsSpeechEngine {
    async fn speak(&self, text: &str) -> Result<mpsc::UnboundedReceiver<SpeechEvent>> {
        let utterance_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut utterances) = self.utterances.lock() {
            utterances.insert(utterance_id, tx);
        }
        self.outbound
            .send(ServerMessage::Speak {
                utterance_id,
                text: text.to_string(),
                rate: self.rate,
                pitch: self.pitch,
            })
            .ok()
            .context("client connection closed")?;
        Ok(rx)
    }

    async fn cancel(&self) {
        if let Ok(mut utterances) = self.utterances.lock() {
            utterances.clear();
        }
        let _ = self.outbound.send(ServerMessage::CancelSpeech);
    }
}

pub struct WsTextDisplay {
    outbound: Outbound,
}

impl WsTextDisplay {
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl TextDisplay for WsTextDisplay {
    async fn show(&self, text: &str, fade: Duration) {
        let _ = self.outbound.send(ServerMessage::ShowText {
            text: text.to_string(),
            fade_ms: fade.as_millis() as u64,
        });
    }

    async fn hide(&self, fade: Duration) {
        let _ = self.outbound.send(ServerMessage::HideText {
            fade_ms: fade.as_millis() as u64,
        });
    }

    async fn clear(&self) {
        let _ = self.outbound.send(ServerMessage::ClearText);
    }
}

pub struct WsPhotoCapture {
    outbound: Outbound,
}

impl WsPhotoCapture {
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl PhotoCapture for WsPhotoCapture {
    async fn capture(&self, label: &str, region: Region) -> Result<()> {
        self.outbound
            .send(ServerMessage::CapturePhoto {
                label: label.to_string(),
                region,
            })
            .ok()
            .context("client connection closed")
    }
}

/// The three browser adapters for one connection.
pub struct BrowserBridge {
    pub speech: Arc<WsSpeechEngine>,
    pub display: Arc<WsTextDisplay>,
    pub camera: Arc<WsPhotoCapture>,
}

impl BrowserBridge {
    pub fn new(outbound: Outbound, speaking_rate: f64) -> Self {
        Self {
            speech: Arc::new(WsSpeechEngine::new(outbound.clone(), speaking_rate)),
            display: Arc::new(WsTextDisplay::new(outbound.clone())),
            camera: Arc::new(WsPhotoCapture::new(outbound)),
        }
    }
}
