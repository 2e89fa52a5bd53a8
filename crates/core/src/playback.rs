//! Playback Synchronizer
//!
//! Delivers an advisory message through two channels at once: the speech
//! engine and the on-screen text display. The message is split into
//! sentences, and every sentence runs both channels to a joint barrier before
//! the next one starts. Only one playback session is active at a time;
//! starting a new one stops the old one first.
//!
//! Speech engines are unreliable. An utterance that never reports that it
//! started is retried once, and a sentence can never hold the pipeline for
//! longer than its hard cap. Both paths fail open: the sentence is treated as
//! spoken and playback moves on.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle signals reported by a speech engine for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Ended,
    Failed(String),
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Begins speaking `text` and returns the utterance's event stream.
    async fn speak(&self, text: &str) -> anyhow::Result<mpsc::UnboundedReceiver<SpeechEvent>>;
    /// Halts whatever is currently being spoken.
    async fn cancel(&self);
}

#[async_trait]
pub trait TextDisplay: Send + Sync {
    async fn show(&self, text: &str, fade: Duration);
    async fn hide(&self, fade: Duration);
    /// Removes any displayed text immediately.
    async fn clear(&self);
}

#[derive(Debug, Clone)]
pub struct PlaybackTiming {
    /// How long a first attempt may take to report `Started`.
    pub start_grace: Duration,
    /// Start grace for the single retry.
    pub retry_grace: Duration,
    /// Lower bound of the per-sentence hard cap.
    pub hard_cap_floor: Duration,
    pub fade: Duration,
    pub sentence_pause: Duration,
    pub words_per_minute: f64,
    pub speaking_rate: f64,
    pub display_padding: f64,
    pub min_display: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            start_grace: Duration::from_secs(2),
            retry_grace: Duration::from_secs(3),
            hard_cap_floor: Duration::from_secs(15),
            fade: Duration::from_millis(200),
            sentence_pause: Duration::from_millis(500),
            words_per_minute: 150.0,
            speaking_rate: 0.9,
            display_padding: 1.2,
            min_display: Duration::from_secs(1),
        }
    }
}

impl PlaybackTiming {
    /// Estimated time needed to read or hear `sentence`.
    pub fn estimate_duration(&self, sentence: &str) -> Duration {
        let words = sentence.split_whitespace().count() as f64;
        let minutes = words / (self.words_per_minute * self.speaking_rate);
        let estimate = Duration::from_secs_f64(minutes * 60.0 * self.display_padding);
        estimate.max(self.min_display)
    }

    /// Longest a sentence may occupy the pipeline before it is force-completed.
    pub fn hard_cap(&self, estimate: Duration) -> Duration {
        (estimate * 2).max(self.hard_cap_floor)
    }
}

/// Splits text after `.`, `!` or `?` when followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut push = |part: &str| {
        let part = part.trim();
        if !part.is_empty() {
            sentences.push(part.to_string());
        }
    };

    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                let end = i + c.len_utf8();
                push(&text[start..end]);
                start = end;
            }
        }
    }
    push(&text[start..]);
    sentences
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeechState {
    Pending,
    Started,
    Retrying,
    Completed,
    TimedOut,
}

/// One `play` call: the sentences still to deliver and the token that stops
/// them.
#[derive(Debug)]
pub struct PlaybackSession {
    id: u64,
    sentences: Vec<String>,
    cursor: usize,
    cancel: CancellationToken,
}

impl PlaybackSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    /// Index of the sentence currently being delivered.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { sentences: usize },
    Cancelled { completed: usize },
}

impl PlaybackOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PlaybackOutcome::Completed { .. })
    }
}

pub struct PlaybackSynchronizer {
    speech: Arc<dyn SpeechEngine>,
    display: Arc<dyn TextDisplay>,
    timing: PlaybackTiming,
    active: Mutex<Option<(u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl PlaybackSynchronizer {
    pub fn new(speech: Arc<dyn SpeechEngine>, display: Arc<dyn TextDisplay>) -> Self {
        Self::with_timing(speech, display, PlaybackTiming::default())
    }

    pub fn with_timing(
        speech: Arc<dyn SpeechEngine>,
        display: Arc<dyn TextDisplay>,
        timing: PlaybackTiming,
    ) -> Self {
        Self {
            speech,
            display,
            timing,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn timing(&self) -> &PlaybackTiming {
        &self.timing
    }

    /// Plays `text` to the end or until stopped.
    pub async fn play(&self, text: &str) -> PlaybackOutcome {
        let session = self.start(text).await;
        self.run(session).await
    }

    /// Registers a new playback session, stopping any active one.
    ///
    /// Nothing is delivered until the session is passed to [`Self::run`], so
    /// callers can fix the order of sessions before handing delivery to a
    /// separate task.
    pub async fn start(&self, text: &str) -> PlaybackSession {
        self.stop().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *self.active.lock().await = Some((id, cancel.clone()));
        let sentences = split_sentences(text);
        debug!(playback_id = id, sentences = sentences.len(), "playback session started");
        PlaybackSession {
            id,
            sentences,
            cursor: 0,
            cancel,
        }
    }

    /// Delivers the session's sentences in order.
    pub async fn run(&self, mut session: PlaybackSession) -> PlaybackOutcome {
        let token = session.cancel.clone();
        let total = session.sentences.len();

        for (index, sentence) in session.sentences.iter().enumerate() {
            session.cursor = index;
            if index > 0 {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return PlaybackOutcome::Cancelled { completed: index },
                    _ = sleep(self.timing.sentence_pause) => {}
                }
            }

            let estimate = self.timing.estimate_duration(sentence);
            let cap = self.timing.hard_cap(estimate);
            let joint = async {
                tokio::join!(
                    self.speak_sentence(sentence),
                    self.display_sentence(sentence, estimate)
                )
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => return PlaybackOutcome::Cancelled { completed: index },
                result = timeout(cap, joint) => match result {
                    Ok((state, ())) => {
                        debug!(playback_id = session.id, sentence = index, ?state, "sentence delivered");
                    }
                    Err(_) => {
                        warn!(playback_id = session.id, sentence = index, cap_ms = cap.as_millis() as u64, "sentence hit hard cap, forcing completion");
                        self.speech.cancel().await;
                        self.display.hide(self.timing.fade).await;
                    }
                },
            }
        }

        let mut active = self.active.lock().await;
        if matches!(*active, Some((id, _)) if id == session.id) {
            *active = None;
        }
        PlaybackOutcome::Completed { sentences: total }
    }

    /// Cancels the active session, halts speech and clears the display.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn stop(&self) {
        let previous = self.active.lock().await.take();
        if let Some((id, token)) = previous {
            token.cancel();
            debug!(playback_id = id, "playback stopped");
        }
        self.speech.cancel().await;
        self.display.clear().await;
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    async fn speak_sentence(&self, sentence: &str) -> SpeechState {
        let mut state = SpeechState::Pending;
        let mut events = match self.speech.speak(sentence).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = ?e, "speech engine failed to begin utterance");
                return SpeechState::Completed;
            }
        };

        loop {
            let grace = match state {
                SpeechState::Pending => Some(self.timing.start_grace),
                SpeechState::Retrying => Some(self.timing.retry_grace),
                _ => None,
            };
            let next = match grace {
                Some(grace) => timeout(grace, events.recv()).await,
                None => Ok(events.recv().await),
            };

            match next {
                Ok(Some(SpeechEvent::Started)) => state = SpeechState::Started,
                Ok(Some(SpeechEvent::Ended)) | Ok(None) => return SpeechState::Completed,
                Ok(Some(SpeechEvent::Failed(message))) => {
                    warn!(%message, "speech engine reported an error");
                    return SpeechState::Completed;
                }
                Err(_) if state == SpeechState::Pending => {
                    warn!("speech did not start in time, retrying once");
                    self.speech.cancel().await;
                    events = match self.speech.speak(sentence).await {
                        Ok(events) => events,
                        Err(e) => {
                            warn!(error = ?e, "speech retry failed to begin");
                            return SpeechState::Completed;
                        }
                    };
                    state = SpeechState::Retrying;
                }
                Err(_) => {
                    warn!("speech retry did not start either, treating as ended");
                    return SpeechState::TimedOut;
                }
            }
        }
    }

    async fn display_sentence(&self, sentence: &str, estimate: Duration) {
        let fade = self.timing.fade;
        self.display.show(sentence, fade).await;
        sleep(fade + estimate).await;
        self.display.hide(fade).await;
        sleep(fade).await;
    }
}
