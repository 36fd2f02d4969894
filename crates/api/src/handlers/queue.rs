//! Handlers for joining a queue.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;
use waitline_core::store::NewEntry;
use waitline_core::types::DbId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /queues/{queue_id}/join.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinRequest {
    #[validate(length(min = 1, max = 80))]
    pub display_name: String,
    /// Phone or email; only used for duplicate detection and staff contact.
    #[validate(length(min = 3, max = 120))]
    pub contact: String,
    #[validate(range(min = 1, max = 20))]
    pub party_size: u32,
}

/// Response for a successful join.
#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub entry_id: DbId,
    pub verification_code: String,
    pub position: u32,
    pub estimated_wait_secs: u64,
    /// Opaque token the client persists to recover the session.
    pub session_token: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/queues/{queue_id}/join
///
/// Creates an entry at the back of the line and binds a session token to it.
pub async fn join(
    State(state): State<AppState>,
    Path(queue_id): Path<DbId>,
    Json(input): Json<JoinRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let joined = state
        .registry
        .join(
            queue_id,
            NewEntry {
                display_name: input.display_name,
                contact: input.contact,
                party_size: input.party_size,
            },
        )
        .await?;

    let resp = JoinResponse {
        entry_id: joined.snapshot.entry_id,
        verification_code: joined.snapshot.verification_code.clone(),
        position: joined.snapshot.position,
        estimated_wait_secs: joined.snapshot.estimated_wait_secs,
        session_token: joined.session_token,
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: resp })))
}
