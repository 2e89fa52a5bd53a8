//! Advisory Messages
//!
//! An advisory is any text delivered to the player through the spoken and
//! displayed channels. Requests describe *what* should be said as an
//! [`AdvisoryTopic`]; the text itself comes from the text generator, or from a
//! canned fallback when generation is unavailable.

use crate::coaching::{CoachingStrategy, Performance};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryCategory {
    Announcement,
    Coaching,
    Success,
    End,
}

impl AdvisoryCategory {
    /// Whether the game cannot continue sensibly without this message.
    pub fn is_required(self) -> bool {
        !matches!(self, AdvisoryCategory::Coaching)
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            AdvisoryCategory::Coaching => 100,
            _ => 150,
        }
    }
}

impl fmt::Display for AdvisoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvisoryCategory::Announcement => write!(f, "announcement"),
            AdvisoryCategory::Coaching => write!(f, "coaching"),
            AdvisoryCategory::Success => write!(f, "success"),
            AdvisoryCategory::End => write!(f, "end"),
        }
    }
}

/// How a coaching hint should be angled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingFraming {
    /// The player already shows the target, just not strongly enough.
    Reinforce,
    /// The player shows a different expression.
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvisoryTopic {
    Greeting {
        player: String,
    },
    Target {
        label: String,
    },
    Coaching {
        target: String,
        detected: String,
        confidence: f64,
        framing: CoachingFraming,
        attempt_ms: u64,
        strategy: CoachingStrategy,
        performance: Performance,
    },
    Success {
        completed: String,
        next: Option<String>,
    },
    /// Closes the game. `last` is the label matched on the final success, if
    /// the game ended that way, and is congratulated in the same message.
    Finale {
        completed: usize,
        last: Option<String>,
    },
}

impl AdvisoryTopic {
    pub fn category(&self) -> AdvisoryCategory {
        match self {
            AdvisoryTopic::Greeting { .. } | AdvisoryTopic::Target { .. } => {
                AdvisoryCategory::Announcement
            }
            AdvisoryTopic::Coaching { .. } => AdvisoryCategory::Coaching,
            AdvisoryTopic::Success { .. } => AdvisoryCategory::Success,
            AdvisoryTopic::Finale { .. } => AdvisoryCategory::End,
        }
    }

    /// Name of the prompt template that renders this topic.
    pub fn template_key(&self) -> &'static str {
        match self {
            AdvisoryTopic::Greeting { .. } => "greeting",
            AdvisoryTopic::Target { .. } => "target",
            AdvisoryTopic::Coaching {
                framing: CoachingFraming::Reinforce,
                ..
            } => "coaching_reinforce",
            AdvisoryTopic::Coaching {
                framing: CoachingFraming::Redirect,
                ..
            } => "coaching_redirect",
            AdvisoryTopic::Success { .. } => "success",
            AdvisoryTopic::Finale { .. } => "finale",
        }
    }

    /// The label the topic is about, if any.
    pub fn target_label(&self) -> Option<&str> {
        match self {
            AdvisoryTopic::Target { label } => Some(label.as_str()),
            AdvisoryTopic::Coaching { target, .. } => Some(target.as_str()),
            AdvisoryTopic::Success { completed, .. } => Some(completed.as_str()),
            AdvisoryTopic::Finale { last, .. } => last.as_deref(),
            AdvisoryTopic::Greeting { .. } => None,
        }
    }

    /// Locally generated text used when the generator cannot be relied on.
    pub fn fallback_text(&self) -> String {
        match self {
            AdvisoryTopic::Greeting { player } => format!(
                "Hello, {player}. Welcome to the Emotion Game! Try to match the target emotion shown on screen. Hold the expression for a moment to register. Good luck and have fun!"
            ),
            AdvisoryTopic::Target { label } => {
                format!("Get ready. Your first emotion is {label}.")
            }
            AdvisoryTopic::Coaching { target, .. } => coaching_hint(target).to_string(),
            AdvisoryTopic::Success {
                next: Some(next), ..
            } => format!("Good job! Moving to the next emotion. Now show me {next}."),
            AdvisoryTopic::Success { next: None, .. } => "Good job!".to_string(),
            AdvisoryTopic::Finale { last: Some(_), .. } => {
                "Good job! Thank you for playing! You have completed the Emotion Game!".to_string()
            }
            AdvisoryTopic::Finale { last: None, .. } => {
                "Thank you for playing! You have completed the Emotion Game!".to_string()
            }
        }
    }
}

fn coaching_hint(target: &str) -> &'static str {
    match target {
        "happy" => {
            "Try thinking of something that genuinely makes you smile! Let it show in your eyes too."
        }
        "sad" => {
            "Let your face naturally relax and think of something melancholic. Don't overdo it."
        }
        "angry" => {
            "Focus on tensing your eyebrows and jaw slightly. Think frustrated, not furious."
        }
        "surprised" => "Widen your eyes and raise your eyebrows high. Imagine unexpected news!",
        "fearful" => "Show caution in your eyes and eyebrows. Think startled, not terrified.",
        "disgusted" => "Wrinkle your nose slightly and think of an unpleasant smell.",
        _ => "Keep practicing! You're getting better at expressing emotions.",
    }
}

/// An outbound request, stamped with its sequence id before it is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryRequest {
    pub sequence: u64,
    pub topic: AdvisoryTopic,
}

impl AdvisoryRequest {
    pub fn category(&self) -> AdvisoryCategory {
        self.topic.category()
    }

    pub fn fallback(&self) -> AdvisoryMessage {
        AdvisoryMessage {
            text: self.topic.fallback_text(),
            issued_sequence: self.sequence,
            category: self.category(),
        }
    }
}

/// Text ready for playback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryMessage {
    pub text: String,
    pub issued_sequence: u64,
    pub category: AdvisoryCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_coaching_is_optional() {
        assert!(AdvisoryCategory::Announcement.is_required());
        assert!(AdvisoryCategory::Success.is_required());
        assert!(AdvisoryCategory::End.is_required());
        assert!(!AdvisoryCategory::Coaching.is_required());
    }

    #[test]
    fn test_topic_categories() {
        let greeting = AdvisoryTopic::Greeting {
            player: "Ada".into(),
        };
        let finale = AdvisoryTopic::Finale {
            completed: 3,
            last: None,
        };
        assert_eq!(greeting.category(), AdvisoryCategory::Announcement);
        assert_eq!(finale.category(), AdvisoryCategory::End);
    }

    #[test]
    fn test_finale_acknowledges_last_success() {
        let finale = AdvisoryTopic::Finale {
            completed: 3,
            last: Some("surprised".into()),
        };
        assert_eq!(finale.target_label(), Some("surprised"));
        assert!(finale.fallback_text().starts_with("Good job!"));

        let skipped = AdvisoryTopic::Finale {
            completed: 1,
            last: None,
        };
        assert_eq!(skipped.target_label(), None);
        assert!(skipped.fallback_text().starts_with("Thank you"));
    }

    #[test]
    fn test_coaching_template_follows_framing() {
        let topic = AdvisoryTopic::Coaching {
            target: "sad".into(),
            detected: "happy".into(),
            confidence: 12.0,
            framing: CoachingFraming::Redirect,
            attempt_ms: 9000,
            strategy: CoachingStrategy::Struggling,
            performance: Performance::from_history(&[]),
        };
        assert_eq!(topic.template_key(), "coaching_redirect");
        assert!(topic.fallback_text().contains("melancholic"));
    }

    #[test]
    fn test_success_fallback_names_next_target() {
        let request = AdvisoryRequest {
            sequence: 4,
            topic: AdvisoryTopic::Success {
                completed: "happy".into(),
                next: Some("angry".into()),
            },
        };
        let message = request.fallback();
        assert_eq!(message.issued_sequence, 4);
        assert_eq!(message.category, AdvisoryCategory::Success);
        assert!(message.text.ends_with("Now show me angry."));
    }
}
