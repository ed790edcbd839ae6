//! Typed errors for the job, ledger, asset, and blob stores.

use atelier_core::status::JobStatus;
use atelier_core::types::{JobId, OwnerId};
use atelier_core::CoreError;

use crate::models::ledger::ReservationState;

/// Errors from the job and asset stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The compare-and-set lost: the job was not in the expected status.
    /// Callers racing a terminal transition treat this as "someone else won".
    #[error("Transition conflict on job {id}: expected {expected}, found {found}")]
    TransitionConflict {
        id: JobId,
        expected: JobStatus,
        found: JobStatus,
    },

    #[error("Asset already recorded for job {0}")]
    DuplicateAsset(JobId),

    #[error("Stored record for job {id} is corrupt: {reason}")]
    CorruptRecord { id: JobId, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the token ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient tokens: need {needed}, have {remaining}")]
    InsufficientTokens { needed: i64, remaining: i64 },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("No reservation found for job {0}")]
    ReservationNotFound(JobId),

    #[error("Reservation for job {job_id} is already {state}")]
    AlreadySettled {
        job_id: JobId,
        state: ReservationState,
    },

    #[error("Duplicate reservation for job {0}")]
    DuplicateReservation(JobId),

    /// Accounting invariant breach (balance would go negative, or a stored
    /// row cannot be read back). Never retried; requires operator attention.
    #[error("Ledger corrupt for owner {0}")]
    Corrupt(OwnerId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from blob storage backends.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error writing blob: {0}")]
    Io(#[from] std::io::Error),
}
