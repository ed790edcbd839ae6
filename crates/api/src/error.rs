use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use atelier_core::CoreError;
use atelier_pipeline::ServiceError;
use atelier_store::{LedgerError, StoreError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`ServiceError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the job service.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Service(err) => classify_service_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_service_error(err: &ServiceError) -> (StatusCode, &'static str, String) {
    match err {
        ServiceError::Core(core) => classify_core_error(core),
        ServiceError::Store(store) => classify_store_error(store),
        ServiceError::Ledger(ledger) => classify_ledger_error(ledger),
    }
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Cannot move a {from} job to {to}"),
        ),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Classify a store error into an HTTP status, error code, and message.
///
/// - Missing rows map to 404.
/// - Lost status races and duplicate assets map to 409.
/// - Corrupt rows and database failures map to 500 with a sanitized message.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::JobNotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("job with id {id} not found"),
        ),
        StoreError::TransitionConflict {
            expected, found, ..
        } => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Job changed state; expected {expected}, found {found}"),
        ),
        StoreError::DuplicateAsset(job_id) => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Job {job_id} already has an asset"),
        ),
        StoreError::Core(core) => classify_core_error(core),
        StoreError::CorruptRecord { id, reason } => {
            tracing::error!(record_id = %id, reason = %reason, "Corrupt record");
            internal()
        }
        StoreError::Database(db_err) => {
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
    }
}

/// Classify a ledger error. The interesting one is the spend rejection,
/// which surfaces as 402 so clients can tell "top up" from "fix the request".
fn classify_ledger_error(err: &LedgerError) -> (StatusCode, &'static str, String) {
    match err {
        LedgerError::InsufficientTokens { needed, remaining } => (
            StatusCode::PAYMENT_REQUIRED,
            "INSUFFICIENT_TOKENS",
            format!("Not enough tokens: need {needed}, have {remaining}"),
        ),
        LedgerError::InvalidAmount(amount) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Amount must be positive, got {amount}"),
        ),
        LedgerError::ReservationNotFound(job_id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("reservation for job {job_id} not found"),
        ),
        LedgerError::AlreadySettled { job_id, state } => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Reservation for job {job_id} is already {state}"),
        ),
        LedgerError::DuplicateReservation(job_id) => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Job {job_id} already has a reservation"),
        ),
        LedgerError::Corrupt(owner_id) => {
            tracing::error!(owner_id, "Corrupt ledger row");
            internal()
        }
        LedgerError::Database(db_err) => {
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
