//! Axum Router Configuration
//!
//! This module defines the HTTP routing for the application: the health check,
//! the session history endpoints and the WebSocket endpoint that hosts game
//! sessions.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/players/{player}/sessions", get(handlers::player_sessions))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/stats", get(handlers::stats))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Provider};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use emote_core::llm_client::TextGenerator;
    use emote_core::prompts::{PromptBook, TEMPLATE_KEYS};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;
    use tracing::Level;

    struct CannedGenerator;

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
            Ok("Hello.".to_string())
        }
    }

    fn test_state() -> Arc<AppState> {
        let templates = TEMPLATE_KEYS
            .iter()
            .map(|key| (key.to_string(), key.to_string()))
            .collect();
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: None,
            provider: Provider::OpenAI,
            openai_api_key: Some("test".into()),
            gemini_api_key: None,
            chat_model: "gpt-4o-mini".into(),
            log_level: Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
            required_challenges: 3,
            match_threshold: 70.0,
            hold_time: Duration::from_millis(800),
            coaching_interval: Duration::from_millis(8000),
            tick_interval: Duration::from_millis(50),
            generation_timeout: Duration::from_secs(10),
        };
        Arc::new(AppState {
            db: None,
            generator: Arc::new(CannedGenerator),
            prompts: Arc::new(PromptBook::new(templates).unwrap()),
            config: Arc::new(config),
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["persistence"], false);
        assert_eq!(json["required_challenges"], 3);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/leaderboard").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_requires_database() {
        for uri in [
            "/players/Ada/sessions",
            "/stats?player=Ada",
            "/sessions/6f1c1f3e-8a43-4c8e-9d55-3d2f9a7b8e10",
        ] {
            let response = create_router(test_state())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json: Value = serde_json::from_slice(&body).unwrap();
            assert!(json["message"].as_str().unwrap().contains("DATABASE_URL"));
        }
    }

    #[tokio::test]
    async fn test_history_rejects_bad_input() {
        let response = create_router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/players/Ada/sessions?limit=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = create_router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/sessions/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
