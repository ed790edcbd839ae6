use std::sync::Arc;

use atelier_pipeline::JobService;
use atelier_store::DbPool;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// The job service every handler is written against.
    pub service: JobService,
    /// Database connection pool; `None` when running on the in-memory stores.
    pub pool: Option<DbPool>,
    /// Server configuration (CORS, timeouts).
    pub config: Arc<ServerConfig>,
}
