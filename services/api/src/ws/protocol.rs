//! Defines the WebSocket message protocol between the browser client and the API server.

use emote_core::session::GameStatus;
use emote_core::snapshot::{DetectionSnapshot, Region};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a game for the named player. This must be the first message.
    Init { player_name: String },
    /// The latest classifier output. Only the newest snapshot is kept.
    Snapshot(DetectionSnapshot),
    /// The browser began speaking an utterance.
    SpeechStarted { utterance_id: u64 },
    /// The browser finished speaking an utterance.
    SpeechEnded { utterance_id: u64 },
    /// The browser's speech engine failed on an utterance.
    SpeechError {
        utterance_id: u64,
        #[serde(default)]
        message: String,
    },
    Skip,
    Reset,
    ToggleDebug,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms that the game session has started.
    Initialized { session_id: Uuid, required: usize },
    /// Pushes the current game status to the client.
    StateUpdate { status: GameStatus },
    /// Fades a caption in.
    ShowText { text: String, fade_ms: u64 },
    /// Fades the caption out.
    HideText { fade_ms: u64 },
    /// Removes the caption immediately.
    ClearText,
    /// Asks the browser to speak an utterance and report its lifecycle.
    Speak {
        utterance_id: u64,
        text: String,
        rate: f64,
        pitch: f64,
    },
    /// Halts any speech in progress.
    CancelSpeech,
    /// Asks the browser to save a photo of the given region.
    CapturePhoto { label: String, region: Region },
    /// The game is over.
    GameOver { completed: usize },
    /// Reports a fatal error to the client.
    Error { message: String },
}
