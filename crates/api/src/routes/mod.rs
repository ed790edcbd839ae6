pub mod health;
pub mod jobs;
pub mod ledger;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                      list, submit (GET, POST)
/// /jobs/{id}                 status view (GET), cancel (DELETE)
///
/// /ledger/{owner_id}         account balances (GET)
/// /ledger/{owner_id}/grant   top up (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Generation job submission and lifecycle.
        .nest("/jobs", jobs::router())
        // Token balances and grants.
        .nest("/ledger", ledger::router())
}
