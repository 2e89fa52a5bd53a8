use thiserror::Error;

/// Errors raised when a game session cannot be set up.
///
/// Everything that can go wrong while a session is running (generation
/// failures, stale responses, speech engine trouble, missed captures) is
/// absorbed by the loop. Only configuration invariants are fatal, and they are
/// rejected before the first tick.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error(
        "required challenge count {required} exceeds the {available} playable labels"
    )]
    NotEnoughLabels { required: usize, available: usize },
    #[error("required challenge count must be at least 1")]
    NoChallenges,
    #[error("invalid game configuration: {0}")]
    InvalidConfig(String),
}
