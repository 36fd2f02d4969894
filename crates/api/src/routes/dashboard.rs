//! Route definitions for the dashboard idle-session guard.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::dashboard;
use crate::state::AppState;

/// Routes mounted at `/dashboard/session`.
///
/// ```text
/// GET  /        -> session_status
/// POST /extend  -> extend_session
/// POST /logout  -> logout
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::session_status))
        .route("/extend", post(dashboard::extend_session))
        .route("/logout", post(dashboard::logout))
}
