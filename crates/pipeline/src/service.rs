//! The submission-side service the HTTP layer is written against.
//!
//! Submission is reserve-then-create: the token hold is taken first, keyed
//! by the job id assigned up front, and the row insert follows. If the
//! insert fails the hold is rolled back, so a rejected request never keeps
//! tokens. The happy path ends with the job on the dispatch queue.

use std::sync::Arc;

use atelier_core::cost;
use atelier_core::params::{JobKind, JobParams};
use atelier_core::status::JobStatus;
use atelier_core::types::{AssetId, JobId, OwnerId, Timestamp};
use atelier_core::CoreError;
use atelier_store::models::job::{Job, JobListQuery, NewJob};
use atelier_store::models::ledger::LedgerAccount;
use atelier_store::{AssetStore, JobStore, LedgerError, StoreError, TokenLedger};

use crate::compensation::{settle_failure, CANCEL_REASON};
use crate::context::PipelineContext;
use crate::events::JobEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything the service can fail with, kept transparent so the HTTP
/// layer can map each underlying variant to a status code.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// Status view
// ---------------------------------------------------------------------------

/// Point-in-time read model for the status endpoint.
///
/// Collapses the job row and its finished asset (when present) into the
/// shape clients poll on, so callers never join the two themselves.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub token_cost: i64,
    pub asset_id: Option<AssetId>,
    pub asset_url: Option<String>,
    pub error_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Submit, query, and cancel jobs; read and top up token balances.
#[derive(Clone)]
pub struct JobService {
    ctx: Arc<PipelineContext>,
}

impl JobService {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Validate, price, reserve, persist, and enqueue a submission.
    pub async fn submit(
        &self,
        owner_id: OwnerId,
        params: JobParams,
    ) -> Result<Job, ServiceError> {
        params.validate()?;
        let token_cost = cost::token_cost(&params);

        let new = NewJob::new(owner_id, params, token_cost);
        let job_id = new.id;
        self.ctx.ledger.reserve(owner_id, job_id, token_cost).await?;

        let job = match self.ctx.jobs.create(new).await {
            Ok(job) => job,
            Err(err) => {
                // Roll the hold back before surfacing the error.
                if let Err(refund_err) = self.ctx.ledger.refund(job_id).await {
                    tracing::error!(
                        job_id = %job_id,
                        error = %refund_err,
                        "Rollback refund failed; reservation left open"
                    );
                }
                return Err(err.into());
            }
        };

        self.ctx.queue.push(job.id);
        tracing::info!(
            job_id = %job.id,
            owner_id,
            kind = %job.kind,
            token_cost,
            "Job submitted"
        );
        self.ctx.bus.publish(JobEvent::Submitted {
            job_id: job.id,
            owner_id,
            kind: job.kind,
            token_cost,
        });
        Ok(job)
    }

    /// Fetch a job by id.
    pub async fn get(&self, id: JobId) -> Result<Job, ServiceError> {
        self.ctx.jobs.find(id).await?.ok_or_else(|| {
            ServiceError::Core(CoreError::NotFound {
                entity: "job",
                id: id.to_string(),
            })
        })
    }

    /// Status view for a job: the row plus the finished asset's URL.
    pub async fn status(&self, id: JobId) -> Result<JobStatusView, ServiceError> {
        let job = self.get(id).await?;
        let asset_url = match job.asset_id {
            Some(_) => self
                .ctx
                .assets
                .find_by_job(job.id)
                .await?
                .map(|asset| asset.url),
            None => None,
        };
        Ok(JobStatusView {
            job_id: job.id,
            owner_id: job.owner_id,
            kind: job.kind,
            status: job.status,
            token_cost: job.token_cost,
            asset_id: job.asset_id,
            asset_url,
            error_reason: job.error_reason,
            created_at: job.created_at,
            updated_at: job.updated_at,
        })
    }

    /// List an owner's jobs, newest first.
    pub async fn list(
        &self,
        owner_id: OwnerId,
        query: &JobListQuery,
    ) -> Result<Vec<Job>, ServiceError> {
        Ok(self.ctx.jobs.list(owner_id, query).await?)
    }

    /// Cancel a job on the owner's behalf.
    ///
    /// A pending job settles on the spot: failed, refunded. A processing
    /// job only gets its cancel flag set; the poller honors the flag before
    /// its next provider check, so settlement keeps a single writer.
    pub async fn cancel(&self, id: JobId) -> Result<Job, ServiceError> {
        let job = self.get(id).await?;
        match job.status {
            JobStatus::Pending => self.cancel_pending(job).await,
            JobStatus::Processing => {
                let flagged = self.ctx.jobs.request_cancel(id).await?;
                tracing::info!(job_id = %id, "Cancel requested for processing job");
                Ok(flagged)
            }
            status => Err(ServiceError::Core(CoreError::Conflict(format!(
                "Job is already {status}"
            )))),
        }
    }

    /// Current token balances for an owner.
    pub async fn balance(&self, owner_id: OwnerId) -> Result<LedgerAccount, ServiceError> {
        Ok(self.ctx.ledger.balance(owner_id).await?)
    }

    /// Top up an owner's balance.
    pub async fn grant(
        &self,
        owner_id: OwnerId,
        amount: i64,
    ) -> Result<LedgerAccount, ServiceError> {
        let account = self.ctx.ledger.grant(owner_id, amount).await?;
        tracing::info!(
            owner_id,
            amount,
            balance_remaining = account.balance_remaining,
            "Tokens granted"
        );
        Ok(account)
    }

    // ---- private helpers ----

    async fn cancel_pending(&self, job: Job) -> Result<Job, ServiceError> {
        if settle_failure(&self.ctx, &job, JobStatus::Failed, CANCEL_REASON).await? {
            return self.get(job.id).await;
        }
        // The dispatcher moved the job mid-cancel. If it is processing now
        // the flag path still works; any other state is a real conflict.
        let flagged = self.ctx.jobs.request_cancel(job.id).await?;
        Ok(flagged)
    }
}
