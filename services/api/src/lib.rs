//! Emote API Library Crate
//!
//! This library contains the web service around the game core: configuration,
//! shared state, optional persistence and session history, HTTP handlers,
//! the WebSocket session logic and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
