//! WebSocket Game Sessions
//!
//! Each connection hosts one game. It is structured into submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `bridge`: Adapts the browser's speech engine, caption overlay and camera to the game runtime.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.

pub mod bridge;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
