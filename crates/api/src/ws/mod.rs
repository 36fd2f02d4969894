//! WebSocket infrastructure for real-time delivery.
//!
//! Provides the session-keyed connection registry, the wire protocol, the
//! heartbeat task, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;
pub mod protocol;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::ConnectionManager;
pub use protocol::{ClientMessage, ServerMessage};
