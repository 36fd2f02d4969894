//! Handlers for merchant actions on the line.
//!
//! All endpoints require an authenticated merchant. Mutation errors are
//! synchronous and immediate; the resulting customer notifications are
//! asynchronous and best-effort.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use waitline_core::config::QueueDirectory;
use waitline_core::entry::{EntryState, QueueEntry};
use waitline_core::error::CoreError;
use waitline_core::types::{DbId, Timestamp};

use crate::error::AppResult;
use crate::middleware::auth::AuthMerchant;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Response for call/seat/cancel actions.
#[derive(Debug, Serialize)]
pub struct EntryActionResponse {
    pub entry_id: DbId,
    pub state: EntryState,
    pub position: u32,
    pub verification_code: String,
}

impl From<QueueEntry> for EntryActionResponse {
    fn from(entry: QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            state: entry.state,
            position: entry.position,
            verification_code: entry.verification_code,
        }
    }
}

/// One row of the merchant's line view.
#[derive(Debug, Serialize)]
pub struct LineEntry {
    pub entry_id: DbId,
    pub display_name: String,
    pub party_size: u32,
    pub state: EntryState,
    pub position: u32,
    pub verification_code: String,
    pub created_at: Timestamp,
}

/// Request body for PUT /merchant/queues/{queue_id}/open.
#[derive(Debug, Deserialize)]
pub struct SetOpenRequest {
    pub open: bool,
}

// ---------------------------------------------------------------------------
// Entry actions
// ---------------------------------------------------------------------------

/// POST /api/v1/merchant/entries/{entry_id}/call
///
/// Calls the entry to the counter and, when the queue configures one,
/// schedules the auto-revert call timeout.
pub async fn call_entry(
    merchant: AuthMerchant,
    State(state): State<AppState>,
    Path(entry_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let entry = state.store.call(entry_id).await?;

    if let Some(delay) = state
        .directory
        .get(entry.queue_id)
        .and_then(|config| config.call_timeout)
    {
        let store = Arc::clone(&state.store);
        state.timeouts.schedule(entry_id, delay, async move {
            match store.revert_call(entry_id).await {
                Ok(_) => {}
                // Seated or cancelled in the meantime: nothing to revert.
                Err(e) => tracing::debug!(entry_id, error = %e, "Call-timeout revert skipped"),
            }
        });
    }

    tracing::info!(
        entry_id,
        merchant_id = merchant.merchant_id,
        "Entry called by merchant"
    );
    Ok(Json(DataResponse {
        data: EntryActionResponse::from(entry),
    }))
}

/// POST /api/v1/merchant/entries/{entry_id}/seat
///
/// Confirms seating and aborts any pending call timeout.
pub async fn seat_entry(
    merchant: AuthMerchant,
    State(state): State<AppState>,
    Path(entry_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let entry = state.store.seat(entry_id).await?;
    state.timeouts.cancel(entry_id);

    tracing::info!(
        entry_id,
        merchant_id = merchant.merchant_id,
        "Entry seated by merchant"
    );
    Ok(Json(DataResponse {
        data: EntryActionResponse::from(entry),
    }))
}

/// POST /api/v1/merchant/entries/{entry_id}/cancel
///
/// Merchant-side cancellation. The customer's session keeps its grace-period
/// rejoin right, same as a self-cancellation.
pub async fn cancel_entry(
    merchant: AuthMerchant,
    State(state): State<AppState>,
    Path(entry_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = state.store.cancel(entry_id).await?;
    state.registry.begin_grace(&cancelled).await;
    state.timeouts.cancel(entry_id);

    tracing::info!(
        entry_id,
        merchant_id = merchant.merchant_id,
        "Entry cancelled by merchant"
    );
    Ok(Json(DataResponse {
        data: EntryActionResponse::from(cancelled),
    }))
}

// ---------------------------------------------------------------------------
// Line view / queue state
// ---------------------------------------------------------------------------

/// GET /api/v1/merchant/queues/{queue_id}/entries
///
/// Active entries in position order.
pub async fn list_entries(
    _merchant: AuthMerchant,
    State(state): State<AppState>,
    Path(queue_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let entries = state.store.list_active(queue_id).await?;
    let rows: Vec<LineEntry> = entries
        .into_iter()
        .map(|e| LineEntry {
            entry_id: e.id,
            display_name: e.display_name,
            party_size: e.party_size,
            state: e.state,
            position: e.position,
            verification_code: e.verification_code,
            created_at: e.created_at,
        })
        .collect();

    Ok(Json(DataResponse { data: rows }))
}

/// PUT /api/v1/merchant/queues/{queue_id}/open
///
/// Flip the queue's open/closed state.
pub async fn set_open(
    merchant: AuthMerchant,
    State(state): State<AppState>,
    Path(queue_id): Path<DbId>,
    Json(input): Json<SetOpenRequest>,
) -> AppResult<impl IntoResponse> {
    if !state.directory.set_open(queue_id, input.open) {
        return Err(CoreError::QueueNotFound(queue_id).into());
    }

    tracing::info!(
        queue_id,
        open = input.open,
        merchant_id = merchant.merchant_id,
        "Queue open state changed"
    );
    Ok(Json(DataResponse {
        data: serde_json::json!({ "queue_id": queue_id, "open": input.open }),
    }))
}
