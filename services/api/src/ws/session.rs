//! Manages the WebSocket connection lifecycle for a game session.

use super::{
    bridge::{BrowserBridge, Outbound, WsSpeechEngine},
    protocol::{ClientMessage, ServerMessage},
};
use crate::{db::DbEventSink, state::AppState};
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use emote_core::{
    capture::CaptureCoordinator,
    controller::GameLoopController,
    events::{EventSink, TracingEventSink},
    playback::{PlaybackSynchronizer, PlaybackTiming, SpeechEvent},
    runtime::{Collaborators, ControlInput, GameRuntime, SessionSummary},
    session::GameStatus,
    snapshot::DetectionSnapshot,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Waits for the `init` message, builds the game runtime wired to this
/// browser, and then relays messages in both directions until the game ends
/// or the client leaves.
#[instrument(name = "ws_session", skip_all, fields(session_id, player))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let temp_id: u32 = rand::random();
    tracing::Span::current().record("session_id", tracing::field::display(temp_id));
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_outbound(socket_tx, outbound_rx));

    // The first message from the client must be an `init` message.
    let player_name = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            writer.abort();
            return;
        }
    };
    let player_name = match player_name {
        Ok(name) => name,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = outbound.send(ServerMessage::Error {
                message: e.to_string(),
            });
            drop(outbound);
            let _ = writer.await;
            return;
        }
    };

    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    tracing::Span::current().record("player", player_name.as_str());

    let session_span = tracing::info_span!("game_runtime", %session_id);
    let result = run_game_session(
        &state,
        session_id,
        player_name,
        outbound.clone(),
        socket_rx,
    )
    .instrument(session_span)
    .await;

    match result {
        Ok(summary) => info!(
            completed = summary.completed_count,
            required = summary.required_count,
            mode = %summary.mode,
            "Game session finished."
        ),
        Err(e) => {
            error!(error = ?e, "Game session terminated with error.");
            let _ = outbound.send(ServerMessage::Error {
                message: e.to_string(),
            });
        }
    }

    drop(outbound);
    let _ = writer.await;
    info!("WebSocket connection closed.");
}

fn parse_init(text: &str) -> Result<String> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init { player_name } => {
            let player_name = player_name.trim().to_string();
            if player_name.is_empty() {
                return Err(anyhow!("`player_name` must not be empty"));
            }
            Ok(player_name)
        }
        _ => Err(anyhow!("First message must be `init`")),
    }
}

/// Runs one game on an initialized connection.
async fn run_game_session(
    state: &Arc<AppState>,
    session_id: Uuid,
    player_name: String,
    outbound: Outbound,
    mut socket_rx: SplitStream<WebSocket>,
) -> Result<SessionSummary> {
    let game_config = state.config.game_config();
    let required = game_config.required_count;
    let controller = GameLoopController::new(game_config, player_name.clone())?;

    let events: Arc<dyn EventSink> = match &state.db {
        Some(db) => {
            db.create_session(session_id, &player_name, required).await?;
            Arc::new(DbEventSink::new(db.clone(), session_id))
        }
        None => Arc::new(TracingEventSink),
    };

    let timing = PlaybackTiming::default();
    let bridge = BrowserBridge::new(outbound.clone(), timing.speaking_rate);
    let collaborators = Collaborators {
        generator: state.generator.clone(),
        prompts: state.prompts.clone(),
        playback: Arc::new(PlaybackSynchronizer::with_timing(
            bridge.speech.clone(),
            bridge.display.clone(),
            timing,
        )),
        capture: CaptureCoordinator::new(bridge.camera.clone()),
        events,
    };

    let _ = outbound.send(ServerMessage::Initialized {
        session_id,
        required,
    });

    let runtime = GameRuntime::new(controller, collaborators);
    let status_forwarder = tokio::spawn(forward_status(runtime.subscribe(), outbound.clone()));
    let (snapshot_tx, snapshot_rx) = watch::channel(DetectionSnapshot::default());
    let (control_tx, control_rx) = mpsc::channel(16);
    let mut runtime_handle = tokio::spawn(
        runtime
            .run(snapshot_rx, control_rx)
            .instrument(tracing::Span::current()),
    );

    let summary = loop {
        tokio::select! {
            finished = &mut runtime_handle => {
                let summary = finished?;
                let _ = outbound.send(ServerMessage::GameOver { completed: summary.completed_count });
                break summary;
            }
            incoming = socket_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handle_client_message(msg, &snapshot_tx, &control_tx, &bridge.speech).await,
                    Err(e) => warn!(error = %e, "Ignoring malformed client message."),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client disconnected. Shutting down session.");
                    let _ = control_tx.send(ControlInput::Shutdown).await;
                    break (&mut runtime_handle).await?;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    let _ = control_tx.send(ControlInput::Shutdown).await;
                    break (&mut runtime_handle).await?;
                }
            },
        }
    };

    status_forwarder.abort();
    if let Some(db) = &state.db {
        if let Err(e) = db.finish_session(session_id, &summary).await {
            warn!(error = ?e, "Failed to store session result.");
        }
    }
    Ok(summary)
}

async fn handle_client_message(
    msg: ClientMessage,
    snapshots: &watch::Sender<DetectionSnapshot>,
    controls: &mpsc::Sender<ControlInput>,
    speech: &WsSpeechEngine,
) {
    let control = match msg {
        ClientMessage::Snapshot(snapshot) => {
            snapshots.send_replace(snapshot);
            return;
        }
        ClientMessage::SpeechStarted { utterance_id } => {
            speech.dispatch(utterance_id, SpeechEvent::Started);
            return;
        }
        ClientMessage::SpeechEnded { utterance_id } => {
            speech.dispatch(utterance_id, SpeechEvent::Ended);
            return;
        }
        ClientMessage::SpeechError {
            utterance_id,
            message,
        } => {
            speech.dispatch(utterance_id, SpeechEvent::Failed(message));
            return;
        }
        ClientMessage::Skip => ControlInput::Skip,
        ClientMessage::Reset => ControlInput::Reset,
        ClientMessage::ToggleDebug => ControlInput::ToggleDebug,
        ClientMessage::Init { .. } => {
            warn!("Ignoring repeated init message.");
            return;
        }
    };
    if controls.send(control).await.is_err() {
        warn!(?control, "Game runtime is no longer accepting controls.");
    }
}

async fn forward_status(mut status: watch::Receiver<GameStatus>, outbound: Outbound) {
    loop {
        let current = status.borrow_and_update().clone();
        if outbound
            .send(ServerMessage::StateUpdate { status: current })
            .is_err()
        {
            break;
        }
        if status.changed().await.is_err() {
            break;
        }
    }
}

/// Drains queued server messages into the socket until every sender is gone.
async fn forward_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            warn!(error = ?e, "Failed to write to client WebSocket.");
            break;
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emote_core::playback::SpeechEngine;

    #[test]
    fn test_parse_init_accepts_player_name() {
        let name = parse_init(r#"{"type":"init","player_name":"  Ada "}"#).unwrap();
        assert_eq!(name, "Ada");
    }

    #[test]
    fn test_parse_init_rejects_other_messages() {
        assert!(parse_init(r#"{"type":"skip"}"#).is_err());
        assert!(parse_init(r#"{"type":"init","player_name":""}"#).is_err());
        assert!(parse_init("not json").is_err());
    }

    #[tokio::test]
    async fn test_client_messages_are_routed() {
        let (snapshot_tx, snapshot_rx) = watch::channel(DetectionSnapshot::default());
        let (control_tx, mut control_rx) = mpsc::channel(4);
        let (outbound, _client) = mpsc::unbounded_channel();
        let speech = WsSpeechEngine::new(outbound, 0.9);

        let snapshot = DetectionSnapshot::new([("sad".to_string(), 0.7)].into_iter().collect(), None);
        handle_client_message(
            ClientMessage::Snapshot(snapshot.clone()),
            &snapshot_tx,
            &control_tx,
            &speech,
        )
        .await;
        assert_eq!(*snapshot_rx.borrow(), snapshot);

        handle_client_message(ClientMessage::Skip, &snapshot_tx, &control_tx, &speech).await;
        handle_client_message(ClientMessage::ToggleDebug, &snapshot_tx, &control_tx, &speech)
            .await;
        assert_eq!(control_rx.recv().await, Some(ControlInput::Skip));
        assert_eq!(control_rx.recv().await, Some(ControlInput::ToggleDebug));

        let mut utterance = speech.speak("Hi.").await.unwrap();
        handle_client_message(
            ClientMessage::SpeechStarted { utterance_id: 1 },
            &snapshot_tx,
            &control_tx,
            &speech,
        )
        .await;
        assert_eq!(utterance.recv().await, Some(SpeechEvent::Started));
    }
}
