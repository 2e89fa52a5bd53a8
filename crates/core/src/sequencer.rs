//! Advisory Request Sequencing
//!
//! Every outbound advisory request is stamped with a monotonic id before it is
//! sent. User actions that make outstanding requests irrelevant advance the
//! counter without sending anything. When a request resolves, its stamp is
//! compared with the counter: anything behind is stale and its text is thrown
//! away. The network call itself is never aborted.

use crate::advisory::{AdvisoryCategory, AdvisoryMessage, AdvisoryRequest};
use anyhow::Result;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct MessageSequencer {
    counter: u64,
    last_required_issued: u64,
}

/// What to do with a resolved advisory request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The generated text is current and may be played.
    Accepted(AdvisoryMessage),
    /// The generated text is unusable but the category must still be delivered,
    /// so the canned fallback plays instead.
    Substituted(AdvisoryMessage),
    /// Nothing is played.
    Discarded,
}

impl Resolution {
    pub fn into_message(self) -> Option<AdvisoryMessage> {
        match self {
            Resolution::Accepted(message) | Resolution::Substituted(message) => Some(message),
            Resolution::Discarded => None,
        }
    }
}

impl MessageSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps a new outbound request.
    pub fn next_sequence(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Stamps a new outbound request of the given category.
    ///
    /// Required categories also move the mark that decides whether an older
    /// required message has been replaced.
    pub fn stamp(&mut self, category: AdvisoryCategory) -> u64 {
        let sequence = self.next_sequence();
        if category.is_required() {
            self.last_required_issued = sequence;
        }
        sequence
    }

    /// Makes every outstanding request stale without issuing a new one.
    pub fn invalidate(&mut self) {
        self.counter += 1;
        debug!(counter = self.counter, "advisory sequence invalidated");
    }

    pub fn current(&self) -> u64 {
        self.counter
    }

    pub fn is_stale(&self, issued_sequence: u64) -> bool {
        issued_sequence < self.counter
    }

    /// A newer required request has been sent since `issued_sequence`.
    pub fn is_superseded(&self, issued_sequence: u64) -> bool {
        issued_sequence < self.last_required_issued
    }

    /// Decides what happens to a request once its generation call returns.
    ///
    /// Stale text is never played. A stale required message is replaced by its
    /// fallback unless a newer required message exists to take its place.
    /// Newer coaching never displaces a required message.
    pub fn resolve(&self, request: &AdvisoryRequest, outcome: Result<String>) -> Resolution {
        let category = request.category();

        if self.is_stale(request.sequence) {
            debug!(
                sequence = request.sequence,
                current = self.counter,
                %category,
                "discarding stale advisory response"
            );
            if category.is_required() && !self.is_superseded(request.sequence) {
                return Resolution::Substituted(request.fallback());
            }
            return Resolution::Discarded;
        }

        match outcome {
            Ok(text) if !text.trim().is_empty() => Resolution::Accepted(AdvisoryMessage {
                text: text.trim().to_string(),
                issued_sequence: request.sequence,
                category,
            }),
            Ok(_) => {
                warn!(sequence = request.sequence, %category, "generator returned empty text, using fallback");
                Resolution::Substituted(request.fallback())
            }
            Err(e) => {
                warn!(sequence = request.sequence, %category, error = %e, "advisory generation failed, using fallback");
                Resolution::Substituted(request.fallback())
            }
        }
    }
}
