//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the database handle and the text generator.

use crate::config::Config;
use emote_core::{llm_client::TextGenerator, prompts::PromptBook};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Present only when `DATABASE_URL` is configured.
    pub db: Option<Arc<crate::db::Db>>,
    pub generator: Arc<dyn TextGenerator>,
    pub prompts: Arc<PromptBook>,
    pub config: Arc<Config>,
}
