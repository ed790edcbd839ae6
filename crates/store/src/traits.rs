//! Narrow persistence seams the pipeline and API are written against.
//!
//! Every status write goes through [`JobStore::transition`], a compare-and-
//! set keyed on the expected current status. Losing the CAS surfaces as
//! [`StoreError::TransitionConflict`]; callers racing a terminal transition
//! treat that as a no-op.

use std::time::Duration;

use async_trait::async_trait;

use atelier_core::status::JobStatus;
use atelier_core::types::{AssetId, JobId, OwnerId, Timestamp};

use crate::error::{LedgerError, StoreError};
use crate::models::asset::{Asset, NewAsset};
use crate::models::job::{Job, JobListQuery, NewJob, TransitionChanges};
use crate::models::ledger::{LedgerAccount, Reservation};

/// Persistence for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a fresh pending job.
    async fn create(&self, new: NewJob) -> Result<Job, StoreError>;

    /// Fetch a job by id.
    async fn find(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// List an owner's jobs, newest first.
    async fn list(&self, owner_id: OwnerId, query: &JobListQuery) -> Result<Vec<Job>, StoreError>;

    /// Compare-and-set the status from `from` to `to`, applying `changes`
    /// in the same write.
    ///
    /// Store invariants applied on top of `changes`: a transition into a
    /// terminal status clears `next_attempt_at` and the lease; a transition
    /// into `processing` resets `poll_attempts` to zero.
    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        changes: TransitionChanges,
    ) -> Result<Job, StoreError>;

    /// Take or renew the work lease on a non-terminal job.
    ///
    /// Returns `None` when another worker holds a live lease. An expired
    /// lease is reclaimable, which is how crashed workers lose their jobs.
    async fn claim(
        &self,
        id: JobId,
        worker: &str,
        lease_ttl: Duration,
    ) -> Result<Option<Job>, StoreError>;

    /// Drop the lease so the job can be picked up again later.
    async fn release(&self, id: JobId) -> Result<(), StoreError>;

    /// Count a submit attempt and set when the next one may run.
    async fn record_submit_attempt(
        &self,
        id: JobId,
        next_attempt_at: Timestamp,
    ) -> Result<Job, StoreError>;

    /// Count a poll attempt; `next_attempt_at = None` means no further check
    /// is scheduled (the caller is about to finalize).
    async fn record_poll_attempt(
        &self,
        id: JobId,
        next_attempt_at: Option<Timestamp>,
    ) -> Result<Job, StoreError>;

    /// Count an asset-persistence attempt.
    async fn record_store_attempt(&self, id: JobId) -> Result<Job, StoreError>;

    /// Flag a processing job for cancellation at the poller's next pass.
    ///
    /// Fails with [`StoreError::TransitionConflict`] when the job is no
    /// longer processing.
    async fn request_cancel(&self, id: JobId) -> Result<Job, StoreError>;

    /// Jobs whose `next_attempt_at` has passed and whose lease is free,
    /// oldest due first. Feeds the poller scan and startup recovery.
    async fn due_jobs(&self, now: Timestamp, limit: i64) -> Result<Vec<Job>, StoreError>;
}

/// The token ledger: admission control and exactly-once settlement.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Top up an owner's total balance, creating the account if needed.
    async fn grant(&self, owner_id: OwnerId, amount: i64) -> Result<LedgerAccount, LedgerError>;

    /// Current balances. Owners without an account read as all zeros.
    async fn balance(&self, owner_id: OwnerId) -> Result<LedgerAccount, LedgerError>;

    /// Atomically check `balance_remaining >= amount` and hold that amount
    /// for `job_id`. No partial effect on rejection.
    async fn reserve(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
        amount: i64,
    ) -> Result<LedgerAccount, LedgerError>;

    /// Settle a reservation as spent. Balances are untouched; the deduction
    /// happened at reserve time.
    async fn consume(&self, job_id: JobId) -> Result<(), LedgerError>;

    /// Release a reservation back to the owner.
    ///
    /// Only a `Reserved` row can be refunded; a second refund (or a refund
    /// after consume) fails with [`LedgerError::AlreadySettled`], which
    /// compensation paths treat as "already done".
    async fn refund(&self, job_id: JobId) -> Result<LedgerAccount, LedgerError>;

    /// Inspect the reservation for a job, if any.
    async fn reservation(&self, job_id: JobId) -> Result<Option<Reservation>, LedgerError>;

    /// Reservations still in the `Reserved` state, oldest first.
    ///
    /// Feeds the settlement reconciler: a hold that is still open after its
    /// job went terminal marks a settlement that was cut short mid-way.
    async fn open_reservations(&self, limit: i64) -> Result<Vec<Reservation>, LedgerError>;
}

/// Persistence for generated assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Record an asset. At most one asset may exist per job.
    async fn insert(&self, new: NewAsset) -> Result<Asset, StoreError>;

    /// Fetch an asset by id.
    async fn find(&self, id: AssetId) -> Result<Option<Asset>, StoreError>;

    /// Fetch the asset produced by a job, if finalization got that far.
    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Asset>, StoreError>;
}
