use crate::coaching::HISTORY_LIMIT;
use crate::sequencer::MessageSequencer;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Tutorial,
    Game,
    End,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tutorial => write!(f, "tutorial"),
            Mode::Game => write!(f, "game"),
            Mode::End => write!(f, "end"),
        }
    }
}

/// Live state of one game. Only the `GameLoopController` mutates it.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_name: String,
    pub mode: Mode,
    pub target_label: Option<String>,
    pub used_labels: HashSet<String>,
    pub completed_count: usize,
    /// Set while every tick since the last miss has matched the target.
    pub hold_start: Option<Instant>,
    pub last_coaching_time: Option<Instant>,
    pub coaching_in_flight: bool,
    pub sequencer: MessageSequencer,
    /// Guards the success path against firing twice for one target.
    pub target_satisfied: bool,
    pub target_started_at: Option<Instant>,
    /// Confidences of the most recent attempts, oldest first.
    pub attempt_history: Vec<f64>,
    pub debug: bool,
}

impl Session {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            mode: Mode::Tutorial,
            target_label: None,
            used_labels: HashSet::new(),
            completed_count: 0,
            hold_start: None,
            last_coaching_time: None,
            coaching_in_flight: false,
            sequencer: MessageSequencer::new(),
            target_satisfied: false,
            target_started_at: None,
            attempt_history: Vec::new(),
            debug: false,
        }
    }

    /// Milliseconds the player has spent on the current target.
    pub fn attempt_duration_ms(&self, now: Instant) -> u64 {
        self.target_started_at
            .map(|started| now.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn record_attempt(&mut self, confidence: f64) {
        self.attempt_history.push(confidence);
        if self.attempt_history.len() > HISTORY_LIMIT {
            let excess = self.attempt_history.len() - HISTORY_LIMIT;
            self.attempt_history.drain(..excess);
        }
    }
}

/// Snapshot of the session published to the UI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStatus {
    pub mode: Mode,
    pub target_label: Option<String>,
    pub completed_count: usize,
    pub required_count: usize,
    pub match_percent: u32,
    pub debug: bool,
}
