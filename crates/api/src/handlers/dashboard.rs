//! Handlers for the dashboard idle-session guard.
//!
//! Independent of the queue engine: these endpoints let the dashboard UI
//! show its inactivity countdown, extend the session on explicit user
//! action, and log out.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use waitline_core::idle::IdleStatus;

use crate::error::AppResult;
use crate::middleware::auth::AuthMerchant;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Response for session status and extension.
#[derive(Debug, Serialize)]
pub struct IdleStatusResponse {
    /// `"active"`, `"warning"`, or `"expired"`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
}

impl From<IdleStatus> for IdleStatusResponse {
    fn from(status: IdleStatus) -> Self {
        match status {
            IdleStatus::Active { remaining } => Self {
                status: "active",
                remaining_secs: Some(remaining.as_secs()),
            },
            IdleStatus::Warning { remaining } => Self {
                status: "warning",
                remaining_secs: Some(remaining.as_secs()),
            },
            IdleStatus::Expired => Self {
                status: "expired",
                remaining_secs: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/dashboard/session
///
/// Where the authenticated session stands relative to its idle deadline.
pub async fn session_status(
    merchant: AuthMerchant,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let status = state.idle.status(&merchant.session_id, chrono::Utc::now());
    Ok(Json(DataResponse {
        data: IdleStatusResponse::from(status),
    }))
}

/// POST /api/v1/dashboard/session/extend
///
/// Explicit extension; resets the inactivity timer to a full allowance.
pub async fn extend_session(
    merchant: AuthMerchant,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let status = state
        .idle
        .extend(&merchant.session_id, chrono::Utc::now())?;
    Ok(Json(DataResponse {
        data: IdleStatusResponse::from(status),
    }))
}

/// POST /api/v1/dashboard/session/logout
///
/// Invalidates the session immediately.
pub async fn logout(
    merchant: AuthMerchant,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let existed = state.idle.revoke(&merchant.session_id);
    tracing::info!(
        merchant_id = merchant.merchant_id,
        existed,
        "Dashboard session logged out"
    );
    Ok(Json(DataResponse {
        data: serde_json::json!({ "logged_out": true }),
    }))
}
