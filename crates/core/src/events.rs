//! Game Events
//!
//! Structured records handed to the logging/persistence collaborator.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventKind {
    AttemptResult,
    MessagePlayed,
}

impl fmt::Display for GameEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEventKind::AttemptResult => write!(f, "attempt_result"),
            GameEventKind::MessagePlayed => write!(f, "message_played"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub kind: GameEventKind,
    pub target_label: Option<String>,
    pub detected_label: Option<String>,
    pub confidence_score: Option<f64>,
    pub duration_ms: u64,
    /// Coaching hint delivered for a failing attempt.
    pub coaching_text: Option<String>,
    pub timestamp: SystemTime,
}

impl GameEvent {
    pub fn attempt(
        target_label: impl Into<String>,
        detected_label: impl Into<String>,
        confidence_score: f64,
        duration_ms: u64,
    ) -> Self {
        Self {
            kind: GameEventKind::AttemptResult,
            target_label: Some(target_label.into()),
            detected_label: Some(detected_label.into()),
            confidence_score: Some(confidence_score),
            duration_ms,
            coaching_text: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_coaching_text(mut self, coaching_text: Option<String>) -> Self {
        self.coaching_text = coaching_text;
        self
    }

    pub fn message_played(target_label: Option<String>, duration_ms: u64) -> Self {
        Self {
            kind: GameEventKind::MessagePlayed,
            target_label,
            detected_label: None,
            confidence_score: None,
            duration_ms,
            coaching_text: None,
            timestamp: SystemTime::now(),
        }
    }
}

/// Receives every event the game produces.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: GameEvent) -> anyhow::Result<()>;
}

/// Writes events to the `game_events` tracing target.
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn record(&self, event: GameEvent) -> anyhow::Result<()> {
        info!(
            target: "game_events",
            kind = %event.kind,
            target_label = event.target_label.as_deref().unwrap_or("-"),
            detected_label = event.detected_label.as_deref().unwrap_or("-"),
            confidence = event.confidence_score.unwrap_or_default(),
            duration_ms = event.duration_ms,
            coaching = event.coaching_text.as_deref().unwrap_or("-"),
            "game event"
        );
        Ok(())
    }
}
