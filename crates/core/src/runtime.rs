//! Game Runtime
//!
//! The single task that owns a [`GameLoopController`]. It drives the tick
//! timer, executes the controller's [`Command`]s against the collaborators and
//! feeds every asynchronous result (generated text, finished playback, user
//! controls) back into the controller on the same task, so the session never
//! has more than one writer. Game events are handed to a separate writer task
//! so a slow event sink never holds up a tick.

use crate::Command;
use crate::advisory::{AdvisoryCategory, AdvisoryMessage, AdvisoryRequest};
use crate::capture::CaptureCoordinator;
use crate::controller::GameLoopController;
use crate::events::{EventSink, GameEvent};
use crate::llm_client::TextGenerator;
use crate::playback::{PlaybackOutcome, PlaybackSynchronizer};
use crate::prompts::PromptBook;
use crate::session::{GameStatus, Mode};
use crate::snapshot::DetectionSnapshot;
use anyhow::anyhow;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

/// User controls accepted while a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    Skip,
    Reset,
    ToggleDebug,
    Shutdown,
}

/// External services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub prompts: Arc<PromptBook>,
    pub playback: Arc<PlaybackSynchronizer>,
    pub capture: CaptureCoordinator,
    pub events: Arc<dyn EventSink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub completed_count: usize,
    pub required_count: usize,
    pub mode: Mode,
}

type AdvisoryResult = (AdvisoryRequest, anyhow::Result<String>);

struct PlaybackReport {
    message: AdvisoryMessage,
    outcome: PlaybackOutcome,
    elapsed: Duration,
    /// The label the message was about, taken from its request.
    target_label: Option<String>,
}

struct Inboxes {
    advisory: mpsc::UnboundedReceiver<AdvisoryResult>,
    playback: mpsc::UnboundedReceiver<PlaybackReport>,
    events: mpsc::UnboundedReceiver<GameEvent>,
}

pub struct GameRuntime {
    controller: GameLoopController,
    collaborators: Collaborators,
    status: watch::Sender<GameStatus>,
    advisory_tx: mpsc::UnboundedSender<AdvisoryResult>,
    playback_tx: mpsc::UnboundedSender<PlaybackReport>,
    events_tx: mpsc::UnboundedSender<GameEvent>,
    inboxes: Option<Inboxes>,
}

impl GameRuntime {
    pub fn new(controller: GameLoopController, collaborators: Collaborators) -> Self {
        let (status, _) = watch::channel(controller.status());
        let (advisory_tx, advisory) = mpsc::unbounded_channel();
        let (playback_tx, playback) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            controller,
            collaborators,
            status,
            advisory_tx,
            playback_tx,
            events_tx,
            inboxes: Some(Inboxes {
                advisory,
                playback,
                events,
            }),
        }
    }

    /// Receives a new [`GameStatus`] whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<GameStatus> {
        self.status.subscribe()
    }

    /// Runs the session until the end message has played, shutdown is
    /// requested, or the snapshot feed closes.
    ///
    /// Returns once every recorded event has been handed to the event sink.
    pub async fn run(
        mut self,
        mut snapshots: watch::Receiver<DetectionSnapshot>,
        mut controls: mpsc::Receiver<ControlInput>,
    ) -> SessionSummary {
        let Some(Inboxes {
            advisory: mut advisory_rx,
            playback: mut playback_rx,
            events,
        }) = self.inboxes.take()
        else {
            return self.summary();
        };
        let writer = tokio::spawn(forward_events(self.collaborators.events.clone(), events));

        let mut ticker = interval(self.controller.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let commands = self.controller.start();
        self.execute(commands).await;
        self.publish_status();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = snapshots.borrow_and_update().clone();
                    let commands = self.controller.on_tick(&snapshot, Instant::now());
                    self.execute(commands).await;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        info!("snapshot feed closed, ending session");
                        break;
                    }
                }
                Some((request, outcome)) = advisory_rx.recv() => {
                    self.on_advisory(request, outcome).await;
                }
                Some(report) = playback_rx.recv() => {
                    if self.on_playback_finished(report).await {
                        info!("end message delivered, session finished");
                        break;
                    }
                }
                control = controls.recv() => match control {
                    Some(ControlInput::Skip) => {
                        let commands = self.controller.skip(Instant::now());
                        self.execute(commands).await;
                    }
                    Some(ControlInput::Reset) => self.controller.reset(),
                    Some(ControlInput::ToggleDebug) => {
                        self.controller.toggle_debug();
                    }
                    Some(ControlInput::Shutdown) | None => {
                        info!("shutdown requested, ending session");
                        break;
                    }
                },
            }
            self.publish_status();
        }

        self.collaborators.playback.stop().await;
        self.publish_status();
        let summary = self.summary();

        // Dropping the runtime closes the event channel so the writer drains and exits.
        drop(self);
        if let Err(e) = writer.await {
            warn!(error = ?e, "event writer task failed");
        }
        summary
    }

    fn summary(&self) -> SessionSummary {
        let session = self.controller.session();
        SessionSummary {
            completed_count: session.completed_count,
            required_count: self.controller.config().required_count,
            mode: session.mode,
        }
    }

    fn publish_status(&self) {
        let status = self.controller.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::RequestAdvisory(request) => self.request_advisory(request),
                Command::StopPlayback => self.collaborators.playback.stop().await,
                Command::Capture { label, region } => {
                    // The handle is dropped; the capture finishes on its own.
                    let _ = self.collaborators.capture.capture_async(&label, region);
                }
                Command::Record(event) => self.record(event),
            }
        }
    }

    fn request_advisory(&self, request: AdvisoryRequest) {
        let prompt = match self.collaborators.prompts.render(&request.topic) {
            Ok(prompt) => prompt,
            Err(e) => {
                let _ = self.advisory_tx.send((request, Err(e)));
                return;
            }
        };

        let generator = self.collaborators.generator.clone();
        let limit = self.controller.config().generation_timeout;
        let tx = self.advisory_tx.clone();
        debug!(sequence = request.sequence, category = %request.category(), "requesting advisory text");
        tokio::spawn(async move {
            let max_tokens = request.category().max_tokens();
            let outcome = match timeout(limit, generator.generate(&prompt, max_tokens)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "text generation timed out after {}ms",
                    limit.as_millis()
                )),
            };
            let _ = tx.send((request, outcome));
        });
    }

    async fn on_advisory(&mut self, request: AdvisoryRequest, outcome: anyhow::Result<String>) {
        let target_label = request.topic.target_label().map(str::to_string);
        let (message, commands) = self.controller.resolve_advisory(&request, outcome);
        self.execute(commands).await;
        let Some(message) = message else {
            return;
        };

        // Starting here keeps playback order equal to resolution order.
        let playback = self.collaborators.playback.clone();
        let session = playback.start(&message.text).await;
        let tx = self.playback_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = playback.run(session).await;
            let _ = tx.send(PlaybackReport {
                message,
                outcome,
                elapsed: started.elapsed(),
                target_label,
            });
        });
    }

    /// Returns true once the session is over.
    async fn on_playback_finished(&mut self, report: PlaybackReport) -> bool {
        let completed = report.outcome.is_completed();
        debug!(
            sequence = report.message.issued_sequence,
            category = %report.message.category,
            outcome = ?report.outcome,
            "playback finished"
        );
        if completed {
            let event =
                GameEvent::message_played(report.target_label, report.elapsed.as_millis() as u64);
            self.record(event);
        }

        let commands =
            self.controller
                .on_playback_finished(&report.message, completed, Instant::now());
        self.execute(commands).await;

        report.message.category == AdvisoryCategory::End && self.controller.is_over()
    }

    fn record(&self, event: GameEvent) {
        if self.events_tx.send(event).is_err() {
            warn!("event writer has stopped, dropping game event");
        }
    }
}

/// Hands queued events to the sink one at a time until the runtime is gone.
async fn forward_events(sink: Arc<dyn EventSink>, mut events: mpsc::UnboundedReceiver<GameEvent>) {
    while let Some(event) = events.recv().await {
        if let Err(e) = sink.record(event).await {
            warn!(error = ?e, "failed to record game event");
        }
    }
}
