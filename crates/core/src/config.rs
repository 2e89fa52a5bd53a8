//! Game Constants and Validation
//!
//! `GameConfig` carries every tunable the control loop and the playback
//! subsystem depend on. The service fills it from the environment; tests build
//! it directly.

use crate::error::GameError;
use std::collections::HashSet;
use std::time::Duration;

/// The label set shipped with the expression classifier.
pub const DEFAULT_LABELS: [&str; 7] = [
    "happy",
    "sad",
    "angry",
    "neutral",
    "surprised",
    "disgusted",
    "fearful",
];

/// Baseline label that is never offered as a target.
pub const RESERVED_LABEL: &str = "neutral";

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Every label the classifier reports, including the reserved one.
    pub labels: Vec<String>,
    /// Label excluded from target selection.
    pub reserved_label: String,
    /// Number of targets the player must complete to finish the game.
    pub required_count: usize,
    /// Minimum match percent (0-100) that counts as holding the target.
    pub match_threshold: f64,
    /// Continuous time above threshold needed for a success.
    pub hold_time: Duration,
    /// Minimum spacing between two coaching requests.
    pub coaching_interval: Duration,
    /// Period of the tick driver.
    pub tick_interval: Duration,
    /// Upper bound on a single text-generation call.
    pub generation_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            reserved_label: RESERVED_LABEL.to_string(),
            required_count: 3,
            match_threshold: 70.0,
            hold_time: Duration::from_millis(800),
            coaching_interval: Duration::from_millis(8000),
            tick_interval: Duration::from_millis(50),
            generation_timeout: Duration::from_millis(10_000),
        }
    }
}

impl GameConfig {
    /// Labels that may be selected as targets.
    pub fn playable_labels(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.labels
            .iter()
            .map(String::as_str)
            .filter(|label| *label != self.reserved_label && seen.insert(*label))
            .collect()
    }

    /// Checks the invariants a session relies on.
    ///
    /// Target selection can never run dry mid-game because a session with more
    /// required challenges than distinct playable labels is refused here.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.required_count == 0 {
            return Err(GameError::NoChallenges);
        }
        let available = self.playable_labels().len();
        if self.required_count > available {
            return Err(GameError::NotEnoughLabels {
                required: self.required_count,
                available,
            });
        }
        if !(0.0..=100.0).contains(&self.match_threshold) {
            return Err(GameError::InvalidConfig(format!(
                "match threshold {} is outside 0..=100",
                self.match_threshold
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(GameError::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
