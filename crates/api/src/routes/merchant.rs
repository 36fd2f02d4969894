//! Route definitions for merchant actions.
//!
//! All routes require a merchant Bearer token.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::merchant;
use crate::state::AppState;

/// Routes mounted at `/merchant`.
///
/// ```text
/// POST /entries/{entry_id}/call    -> call_entry
/// POST /entries/{entry_id}/seat    -> seat_entry
/// POST /entries/{entry_id}/cancel  -> cancel_entry
/// GET  /queues/{queue_id}/entries  -> list_entries
/// PUT  /queues/{queue_id}/open     -> set_open
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/entries/{entry_id}/call", post(merchant::call_entry))
        .route("/entries/{entry_id}/seat", post(merchant::seat_entry))
        .route("/entries/{entry_id}/cancel", post(merchant::cancel_entry))
        .route("/queues/{queue_id}/entries", get(merchant::list_entries))
        .route("/queues/{queue_id}/open", put(merchant::set_open))
}
