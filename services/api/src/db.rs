//! Data Access Layer
//!
//! This module contains all the functions for interacting with the PostgreSQL database.
//! Queries are built at runtime so the service compiles without a live database.

use crate::models::{EventRecord, LabelStats, OverallStats, SessionHistory};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use emote_core::events::{EventSink, GameEvent};
use emote_core::runtime::SessionSummary;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Records the start of a game session.
    pub async fn create_session(
        &self,
        session_id: Uuid,
        player_name: &str,
        required_count: usize,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO game_sessions (id, player_name, required_count) VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(player_name)
        .bind(required_count as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores the final result of a session.
    pub async fn finish_session(&self, session_id: Uuid, summary: &SessionSummary) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE game_sessions
            SET completed_count = $1, final_mode = $2, ended_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(summary.completed_count as i32)
        .bind(summary.mode.to_string())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Appends one game event to a session's log.
    pub async fn insert_event(&self, session_id: Uuid, event: &GameEvent) -> Result<()> {
        let occurred_at: DateTime<Utc> = event.timestamp.into();
        sqlx::query(
            r#"
            INSERT INTO game_events
                (session_id, event_type, target_label, detected_label, confidence_score, duration_ms, coaching_text, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session_id)
        .bind(event.kind.to_string())
        .bind(event.target_label.as_deref())
        .bind(event.detected_label.as_deref())
        .bind(event.confidence_score)
        .bind(event.duration_ms as i64)
        .bind(event.coaching_text.as_deref())
        .bind(occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lists a player's most recent sessions with their attempt totals.
    pub async fn player_history(&self, player_name: &str, limit: i64) -> Result<Vec<SessionHistory>> {
        let sessions = sqlx::query_as::<_, SessionHistory>(
            r#"
            SELECT s.id, s.player_name, s.required_count, s.completed_count, s.final_mode,
                   s.started_at, s.ended_at,
                   COUNT(e.id) AS total_attempts,
                   AVG(e.confidence_score) AS avg_confidence
            FROM game_sessions s
            LEFT JOIN game_events e
                ON e.session_id = s.id AND e.event_type = 'attempt_result'
            WHERE s.player_name = $1
            GROUP BY s.id
            ORDER BY s.started_at DESC
            LIMIT $2
            "#,
        )
        .bind(player_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Retrieves a single session with its attempt totals.
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionHistory>> {
        let session = sqlx::query_as::<_, SessionHistory>(
            r#"
            SELECT s.id, s.player_name, s.required_count, s.completed_count, s.final_mode,
                   s.started_at, s.ended_at,
                   COUNT(e.id) AS total_attempts,
                   AVG(e.confidence_score) AS avg_confidence
            FROM game_sessions s
            LEFT JOIN game_events e
                ON e.session_id = s.id AND e.event_type = 'attempt_result'
            WHERE s.id = $1
            GROUP BY s.id
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Retrieves every event of a session, ordered chronologically.
    pub async fn session_events(&self, session_id: Uuid) -> Result<Vec<EventRecord>> {
        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, session_id, event_type, target_label, detected_label, confidence_score,
                   duration_ms, coaching_text, occurred_at
            FROM game_events
            WHERE session_id = $1
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Per-label attempt statistics, for one player or for everyone.
    ///
    /// An attempt counts as successful when its confidence reached `match_threshold`.
    pub async fn label_stats(
        &self,
        player_name: Option<&str>,
        match_threshold: f64,
    ) -> Result<Vec<LabelStats>> {
        let stats = sqlx::query_as::<_, LabelStats>(
            r#"
            SELECT e.target_label AS target_label,
                   COUNT(*) AS total_attempts,
                   AVG(e.confidence_score) AS avg_confidence,
                   AVG(e.duration_ms)::DOUBLE PRECISION AS avg_duration_ms,
                   COUNT(*) FILTER (WHERE e.confidence_score >= $2) AS successful_attempts
            FROM game_events e
            JOIN game_sessions s ON s.id = e.session_id
            WHERE e.event_type = 'attempt_result'
              AND e.target_label IS NOT NULL
              AND ($1::TEXT IS NULL OR s.player_name = $1)
            GROUP BY e.target_label
            ORDER BY e.target_label
            "#,
        )
        .bind(player_name)
        .bind(match_threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Session and attempt totals, for one player or for everyone.
    pub async fn overall_stats(&self, player_name: Option<&str>) -> Result<OverallStats> {
        let stats = sqlx::query_as::<_, OverallStats>(
            r#"
            SELECT COUNT(DISTINCT s.id) AS total_sessions,
                   COUNT(e.id) AS total_attempts,
                   AVG(e.confidence_score) AS avg_confidence,
                   (SELECT AVG(completed_count)::DOUBLE PRECISION
                    FROM game_sessions
                    WHERE $1::TEXT IS NULL OR player_name = $1) AS avg_completed
            FROM game_sessions s
            LEFT JOIN game_events e
                ON e.session_id = s.id AND e.event_type = 'attempt_result'
            WHERE $1::TEXT IS NULL OR s.player_name = $1
            "#,
        )
        .bind(player_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

/// Persists a session's game events.
pub struct DbEventSink {
    db: Arc<Db>,
    session_id: Uuid,
}

impl DbEventSink {
    pub fn new(db: Arc<Db>, session_id: Uuid) -> Self {
        Self { db, session_id }
    }
}

#[async_trait]
impl EventSink for DbEventSink {
    async fn record(&self, event: GameEvent) -> Result<()> {
        self.db.insert_event(self.session_id, &event).await
    }
}
