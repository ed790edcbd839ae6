//! Route definitions for the `/ledger` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::ledger;
use crate::state::AppState;

/// Routes mounted at `/ledger`.
///
/// ```text
/// GET    /{owner_id}          -> get_balance
/// POST   /{owner_id}/grant    -> grant_tokens
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner_id}", get(ledger::get_balance))
        .route("/{owner_id}/grant", post(ledger::grant_tokens))
}
