//! Route definitions for the customer session.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::session;
use crate::state::AppState;

/// Routes mounted at `/session`.
///
/// ```text
/// GET  /{token}         -> status
/// POST /{token}/cancel  -> cancel
/// POST /{token}/restore -> restore
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{token}", get(session::status))
        .route("/{token}/cancel", post(session::cancel))
        .route("/{token}/restore", post(session::restore))
}
