//! API and Database Models
//!
//! Row types read back from the session history tables, and the payloads of
//! the read-only history endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored game session with its attempt totals.
#[derive(Serialize, FromRow, Debug, Clone)]
pub struct SessionHistory {
    pub id: Uuid,
    pub player_name: String,
    pub required_count: i32,
    pub completed_count: i32,
    pub final_mode: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_attempts: i64,
    pub avg_confidence: Option<f64>,
}

#[derive(Serialize, FromRow, Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub event_type: String,
    pub target_label: Option<String>,
    pub detected_label: Option<String>,
    pub confidence_score: Option<f64>,
    pub duration_ms: i64,
    pub coaching_text: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A session together with its event log.
#[derive(Serialize, Debug)]
pub struct SessionDetail {
    pub session: SessionHistory,
    pub events: Vec<EventRecord>,
}

/// Attempt statistics for one target label.
#[derive(Serialize, FromRow, Debug, Clone)]
pub struct LabelStats {
    pub target_label: String,
    pub total_attempts: i64,
    pub avg_confidence: Option<f64>,
    pub avg_duration_ms: Option<f64>,
    pub successful_attempts: i64,
}

#[derive(Serialize, FromRow, Debug, Clone)]
pub struct OverallStats {
    pub total_sessions: i64,
    pub total_attempts: i64,
    pub avg_confidence: Option<f64>,
    pub avg_completed: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct PlayerStats {
    /// `None` when the statistics cover every player.
    pub player: Option<String>,
    pub labels: Vec<LabelStats>,
    pub overall: OverallStats,
}

#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    10
}

#[derive(Deserialize, Debug)]
pub struct StatsQuery {
    pub player: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
