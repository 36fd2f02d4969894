//! Route definitions for public queue joining.

use axum::routing::post;
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Routes mounted at `/queues`.
///
/// ```text
/// POST /{queue_id}/join -> join
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{queue_id}/join", post(queue::join))
}
