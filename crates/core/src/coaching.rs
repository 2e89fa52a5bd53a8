//! Coaching Gate
//!
//! Decides when a player who keeps missing the target gets a coaching hint.
//! A hint is requested at most once per interval and never while another hint
//! is still being generated. The in-flight flag is checked and set inside the
//! same synchronous call, and it is cleared by the controller when the request
//! resolves, whatever the outcome.
//!
//! Hints adapt to how the session is going: the confidences of recent attempts
//! are summarised into a [`Performance`] and mapped to a [`CoachingStrategy`].

use crate::advisory::{AdvisoryTopic, CoachingFraming};
use crate::session::Session;
use crate::snapshot::DetectionSnapshot;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Number of recent attempt confidences a session keeps for analysis.
pub const HISTORY_LIMIT: usize = 10;

const STRUGGLING_BELOW: f64 = 40.0;
const IMPROVING_BELOW: f64 = 70.0;
const TREND_MARGIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// No attempts yet.
    Unknown,
    Stable,
    Improving,
    Declining,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Unknown => write!(f, "unknown"),
            Trend::Stable => write!(f, "stable"),
            Trend::Improving => write!(f, "improving"),
            Trend::Declining => write!(f, "declining"),
        }
    }
}

/// Summary of the confidences recorded for a session's attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Performance {
    pub average: f64,
    pub trend: Trend,
    pub count: usize,
}

impl Performance {
    /// Averages the history and compares the last three attempts with the
    /// (up to) three before them.
    pub fn from_history(history: &[f64]) -> Self {
        if history.is_empty() {
            return Self {
                average: 0.0,
                trend: Trend::Unknown,
                count: 0,
            };
        }
        let mean = |scores: &[f64]| scores.iter().sum::<f64>() / scores.len() as f64;

        let mut trend = Trend::Stable;
        if history.len() >= 3 {
            let split = history.len() - 3;
            let recent = &history[split..];
            let earlier = &history[split.saturating_sub(3)..split];
            if !earlier.is_empty() {
                let (recent, earlier) = (mean(recent), mean(earlier));
                if recent > earlier + TREND_MARGIN {
                    trend = Trend::Improving;
                } else if recent < earlier - TREND_MARGIN {
                    trend = Trend::Declining;
                }
            }
        }

        Self {
            average: mean(history),
            trend,
            count: history.len(),
        }
    }
}

/// Tone of a coaching hint, chosen from the player's average confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingStrategy {
    Struggling,
    Improving,
    Proficient,
}

impl CoachingStrategy {
    pub fn for_average(average: f64) -> Self {
        if average < STRUGGLING_BELOW {
            CoachingStrategy::Struggling
        } else if average < IMPROVING_BELOW {
            CoachingStrategy::Improving
        } else {
            CoachingStrategy::Proficient
        }
    }

    /// Instruction handed to the generator along with the hint request.
    pub fn guidance(self) -> &'static str {
        match self {
            CoachingStrategy::Struggling => {
                "The player is struggling, so keep the tip very simple and reassuring."
            }
            CoachingStrategy::Improving => {
                "The player is getting closer, so build on what is already working."
            }
            CoachingStrategy::Proficient => {
                "The player is doing well overall, so offer one small refinement."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoachingGate {
    interval: Duration,
}

impl CoachingGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the topic of a coaching request if one should be issued now.
    ///
    /// On `Some`, the session has already been marked as having a coaching
    /// request in flight, and the attempt's confidence has been added to its
    /// history.
    pub fn maybe_coach(
        &self,
        snapshot: &DetectionSnapshot,
        session: &mut Session,
        now: Instant,
    ) -> Option<AdvisoryTopic> {
        if let Some(last) = session.last_coaching_time {
            if now.saturating_duration_since(last) <= self.interval {
                return None;
            }
        }
        if session.coaching_in_flight {
            return None;
        }
        if !snapshot.subject_present() {
            return None;
        }
        let target = session.target_label.clone()?;
        let (detected, _) = snapshot.dominant_label()?;

        let framing = if detected == target {
            CoachingFraming::Reinforce
        } else {
            CoachingFraming::Redirect
        };
        let confidence = (snapshot.score(&target) * 100.0).round();
        let performance = Performance::from_history(&session.attempt_history);
        let strategy = CoachingStrategy::for_average(if performance.count > 0 {
            performance.average
        } else {
            confidence
        });
        let topic = AdvisoryTopic::Coaching {
            detected: detected.to_string(),
            confidence,
            framing,
            attempt_ms: session.attempt_duration_ms(now),
            strategy,
            performance,
            target,
        };

        session.coaching_in_flight = true;
        session.last_coaching_time = Some(now);
        session.record_attempt(confidence);
        debug!(?framing, ?strategy, trend = %performance.trend, "coaching gate opened");
        Some(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Mode;

    fn playing_session(start: Instant) -> Session {
        let mut session = Session::new("Ada");
        session.mode = Mode::Game;
        session.target_label = Some("happy".into());
        session.target_started_at = Some(start);
        session.last_coaching_time = Some(start);
        session
    }

    fn snapshot(scores: &[(&str, f64)]) -> DetectionSnapshot {
        DetectionSnapshot::new(
            scores.iter().map(|(l, s)| (l.to_string(), *s)).collect(),
            None,
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_requests_spaced_past_interval_are_accepted() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();
        let mut session = playing_session(start);
        let snap = snapshot(&[("sad", 0.8), ("happy", 0.1)]);

        assert!(gate.maybe_coach(&snap, &mut session, start + ms(8100)).is_some());
        session.coaching_in_flight = false;
        assert!(gate.maybe_coach(&snap, &mut session, start + ms(16200)).is_some());
    }

    #[test]
    fn test_request_inside_interval_is_suppressed() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();
        let mut session = playing_session(start);
        let snap = snapshot(&[("sad", 0.8)]);

        assert!(gate.maybe_coach(&snap, &mut session, start + ms(8100)).is_some());
        session.coaching_in_flight = false;
        assert!(gate.maybe_coach(&snap, &mut session, start + ms(11100)).is_none());
        // Detection state does not matter to the interval gate.
        let empty = DetectionSnapshot::default();
        assert!(gate.maybe_coach(&empty, &mut session, start + ms(11100)).is_none());
    }

    #[test]
    fn test_exactly_one_interval_is_not_enough() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();
        let mut session = playing_session(start);
        let snap = snapshot(&[("sad", 0.8)]);
        assert!(gate.maybe_coach(&snap, &mut session, start + ms(8000)).is_none());
    }

    #[test]
    fn test_in_flight_request_blocks_new_one() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();
        let mut session = playing_session(start);
        let snap = snapshot(&[("sad", 0.8)]);

        assert!(gate.maybe_coach(&snap, &mut session, start + ms(8100)).is_some());
        assert!(session.coaching_in_flight);
        assert!(gate.maybe_coach(&snap, &mut session, start + ms(30000)).is_none());
    }

    #[test]
    fn test_no_subject_means_no_coaching() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();
        let mut session = playing_session(start);
        let empty = DetectionSnapshot::default();

        assert!(gate.maybe_coach(&empty, &mut session, start + ms(9000)).is_none());
        assert!(!session.coaching_in_flight);
        assert_eq!(session.last_coaching_time, Some(start));
    }

    #[test]
    fn test_framing_depends_on_dominant_label() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();

        let mut session = playing_session(start);
        let weak_happy = snapshot(&[("happy", 0.5), ("neutral", 0.3)]);
        match gate.maybe_coach(&weak_happy, &mut session, start + ms(8100)) {
            Some(AdvisoryTopic::Coaching {
                framing,
                detected,
                confidence,
                attempt_ms,
                ..
            }) => {
                assert_eq!(framing, CoachingFraming::Reinforce);
                assert_eq!(detected, "happy");
                assert_eq!(confidence, 50.0);
                assert_eq!(attempt_ms, 8100);
            }
            other => panic!("expected coaching topic, got {other:?}"),
        }

        let mut session = playing_session(start);
        let angry = snapshot(&[("happy", 0.1), ("angry", 0.6)]);
        match gate.maybe_coach(&angry, &mut session, start + ms(8100)) {
            Some(AdvisoryTopic::Coaching { framing, .. }) => {
                assert_eq!(framing, CoachingFraming::Redirect)
            }
            other => panic!("expected coaching topic, got {other:?}"),
        }
    }

    #[test]
    fn test_performance_from_history() {
        let empty = Performance::from_history(&[]);
        assert_eq!(empty.trend, Trend::Unknown);
        assert_eq!(empty.count, 0);

        let short = Performance::from_history(&[20.0, 40.0]);
        assert_eq!(short.trend, Trend::Stable);
        assert_eq!(short.average, 30.0);

        let rising = Performance::from_history(&[10.0, 20.0, 15.0, 40.0, 50.0, 45.0]);
        assert_eq!(rising.trend, Trend::Improving);
        assert_eq!(rising.count, 6);

        let falling = Performance::from_history(&[60.0, 50.0, 40.0, 30.0]);
        assert_eq!(falling.trend, Trend::Declining);

        let flat = Performance::from_history(&[30.0, 32.0, 31.0, 33.0]);
        assert_eq!(flat.trend, Trend::Stable);
    }

    #[test]
    fn test_strategy_thresholds() {
        assert_eq!(CoachingStrategy::for_average(0.0), CoachingStrategy::Struggling);
        assert_eq!(CoachingStrategy::for_average(39.9), CoachingStrategy::Struggling);
        assert_eq!(CoachingStrategy::for_average(40.0), CoachingStrategy::Improving);
        assert_eq!(CoachingStrategy::for_average(70.0), CoachingStrategy::Proficient);
    }

    #[test]
    fn test_strategy_follows_session_history() {
        let gate = CoachingGate::new(ms(8000));
        let start = Instant::now();
        let snap = snapshot(&[("happy", 0.55), ("sad", 0.2)]);

        // Without history the current attempt decides.
        let mut session = playing_session(start);
        match gate.maybe_coach(&snap, &mut session, start + ms(8100)) {
            Some(AdvisoryTopic::Coaching {
                strategy,
                performance,
                ..
            }) => {
                assert_eq!(strategy, CoachingStrategy::Improving);
                assert_eq!(performance.count, 0);
            }
            other => panic!("expected coaching topic, got {other:?}"),
        }
        assert_eq!(session.attempt_history, vec![55.0]);

        // A weak history outweighs a decent current attempt.
        let mut session = playing_session(start);
        for score in [10.0, 15.0, 5.0] {
            session.record_attempt(score);
        }
        match gate.maybe_coach(&snap, &mut session, start + ms(8100)) {
            Some(AdvisoryTopic::Coaching {
                strategy,
                performance,
                ..
            }) => {
                assert_eq!(strategy, CoachingStrategy::Struggling);
                assert_eq!(performance.count, 3);
                assert_eq!(performance.average, 10.0);
            }
            other => panic!("expected coaching topic, got {other:?}"),
        }
    }
}
