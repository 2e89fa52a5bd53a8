pub mod advisory;
pub mod capture;
pub mod coaching;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod llm_client;
pub mod playback;
pub mod prompts;
pub mod runtime;
pub mod sequencer;
pub mod session;
pub mod snapshot;

use advisory::AdvisoryRequest;
use events::GameEvent;
use snapshot::Region;

/// Represents commands that the core logic issues to an external runtime.
///
/// The controller only decides; the runtime performs the side effects
/// (generating text, stopping playback, taking photos, writing events) and
/// reports results back.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate text for the request and play it once it resolves.
    RequestAdvisory(AdvisoryRequest),
    /// Stop whatever is currently being spoken and displayed.
    StopPlayback,
    /// Take a souvenir photo of the matched expression.
    Capture {
        label: String,
        region: Option<Region>,
    },
    /// Hand an event to the event sink.
    Record(GameEvent),
}
