//! Handlers for the `/ledger` resource.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use atelier_core::types::OwnerId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /ledger/{owner_id}/grant`.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub amount: i64,
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// GET /api/v1/ledger/{owner_id}
///
/// Current balances for an owner. An owner with no ledger row reads as an
/// empty account rather than 404.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(owner_id): Path<OwnerId>,
) -> AppResult<impl IntoResponse> {
    let account = state.service.balance(owner_id).await?;
    Ok(Json(DataResponse { data: account }))
}

// ---------------------------------------------------------------------------
// Grant
// ---------------------------------------------------------------------------

/// POST /api/v1/ledger/{owner_id}/grant
///
/// Top up an owner's balance. 400 when the amount is not positive.
pub async fn grant_tokens(
    State(state): State<AppState>,
    Path(owner_id): Path<OwnerId>,
    Json(input): Json<GrantRequest>,
) -> AppResult<impl IntoResponse> {
    let account = state.service.grant(owner_id, input.amount).await?;
    Ok(Json(DataResponse { data: account }))
}
