//! Axum Handlers for the HTTP API
//!
//! The health check plus read-only access to stored session history. History
//! endpoints answer `503` when the service runs without a database.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::{
    db::Db,
    models::{
        ErrorResponse, HistoryQuery, PlayerStats, SessionDetail, SessionHistory, StatsQuery,
    },
    state::AppState,
};

const MAX_HISTORY_LIMIT: i64 = 100;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn require_db(state: &AppState) -> Result<&Db, ApiError> {
    state.db.as_deref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Session history requires DATABASE_URL.".to_string())
    })
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub persistence: bool,
    pub required_challenges: usize,
}

/// Liveness check.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        persistence: state.db.is_some(),
        required_challenges: state.config.required_challenges,
    })
}

/// List a player's most recent sessions.
pub async fn player_sessions(
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SessionHistory>>, ApiError> {
    if !(1..=MAX_HISTORY_LIMIT).contains(&query.limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    let db = require_db(&state)?;
    let sessions = db.player_history(&player, query.limit).await?;
    Ok(Json(sessions))
}

/// Get a session and its full event log.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, ApiError> {
    let db = require_db(&state)?;
    let session = db
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))?;
    let events = db.session_events(id).await?;
    Ok(Json(SessionDetail { session, events }))
}

/// Attempt statistics per target label, optionally for a single player.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<PlayerStats>, ApiError> {
    let db = require_db(&state)?;
    let player = query.player.as_deref();
    let labels = db
        .label_stats(player, state.config.match_threshold)
        .await?;
    let overall = db.overall_stats(player).await?;
    Ok(Json(PlayerStats {
        player: query.player.clone(),
        labels,
        overall,
    }))
}
