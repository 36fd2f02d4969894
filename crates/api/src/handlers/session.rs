//! Handlers for the customer session: status, cancellation, grace rejoin.
//!
//! All three are addressed by the opaque session token. Lookup failures are
//! uniform by construction ([`CoreError::SessionNotFound`] carries no detail),
//! so these endpoints cannot be used to probe other customers' entries.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use waitline_core::entry::EntryState;
use waitline_core::error::CoreError;
use waitline_core::recovery::SessionStatus;
use waitline_core::types::{DbId, Timestamp};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Response for GET /session/{token}.
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub queue_id: DbId,
    pub state: EntryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_secs: Option<u64>,
    /// Whether a grace-period restore is currently possible.
    pub restorable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_deadline: Option<Timestamp>,
}

/// Request body for POST /session/{token}/cancel.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Cancellation requires this explicit confirmation; a bare click must
    /// not drop a customer's place.
    pub confirmed: bool,
}

/// Response for a confirmed cancellation.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Rejoining without losing the position is possible until this instant.
    pub restore_deadline: Timestamp,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/session/{token}
///
/// The current snapshot for a session, or a uniform 404.
pub async fn status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let resp = match state.registry.status(&token, chrono::Utc::now()).await? {
        SessionStatus::Active(snapshot) => SessionStatusResponse {
            queue_id: snapshot.queue_id,
            state: snapshot.state,
            position: Some(snapshot.position),
            verification_code: Some(snapshot.verification_code),
            estimated_wait_secs: Some(snapshot.estimated_wait_secs),
            restorable: false,
            restore_deadline: None,
        },
        SessionStatus::Restorable { queue_id, deadline } => SessionStatusResponse {
            queue_id,
            state: EntryState::Cancelled,
            position: None,
            verification_code: None,
            estimated_wait_secs: None,
            restorable: true,
            restore_deadline: Some(deadline),
        },
    };

    Ok(Json(DataResponse { data: resp }))
}

/// POST /api/v1/session/{token}/cancel
///
/// Cancels the bound entry and opens its grace window. Requires
/// `confirmed: true`.
pub async fn cancel(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(input): Json<CancelRequest>,
) -> AppResult<impl IntoResponse> {
    if !input.confirmed {
        return Err(CoreError::ConfirmationRequired.into());
    }

    let receipt = state.registry.cancel(&token, chrono::Utc::now()).await?;
    // A pending call timeout must not fire against the cancelled entry.
    state.timeouts.cancel(receipt.entry_id);

    Ok(Json(DataResponse {
        data: CancelResponse {
            restore_deadline: receipt.deadline,
        },
    }))
}

/// POST /api/v1/session/{token}/restore
///
/// Rejoins within the grace window, preserving the original position. Past
/// the deadline this is a uniform 404 and a fresh join is required.
pub async fn restore(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.registry.restore(&token, chrono::Utc::now()).await?;
    Ok(Json(DataResponse { data: snapshot }))
}
