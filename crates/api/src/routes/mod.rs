//! Route definitions, one module per surface.

pub mod dashboard;
pub mod health;
pub mod merchant;
pub mod queue;
pub mod session;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// All routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/queues", queue::router())
        .nest("/session", session::router())
        .nest("/merchant", merchant::router())
        .nest("/dashboard/session", dashboard::router())
        // Live channel (WebSocket upgrade).
        .route("/ws", get(ws::ws_handler))
}
