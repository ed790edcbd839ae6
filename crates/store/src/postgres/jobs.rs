//! PostgreSQL [`JobStore`].

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::params::{JobKind, JobParams};
use atelier_core::status::{validate_transition, JobStatus};
use atelier_core::types::{JobId, OwnerId, Timestamp};
use atelier_core::CoreError;

use crate::error::StoreError;
use crate::models::job::{Job, JobListQuery, NewJob, TransitionChanges};
use crate::traits::JobStore;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, kind, params, status, token_cost, \
    external_id, asset_id, error_reason, cancel_requested, \
    submit_attempts, poll_attempts, store_attempts, \
    next_attempt_at, claimed_by, lease_expires_at, \
    created_at, updated_at";

/// Statuses a lease or due-scan may touch.
const ACTIVE_STATUSES: &str = "('pending', 'processing')";

/// Statuses with no outgoing transitions.
const TERMINAL_STATUSES: &str = "('completed', 'failed', 'expired')";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    owner_id: i64,
    kind: String,
    params: serde_json::Value,
    status: String,
    token_cost: i64,
    external_id: Option<String>,
    asset_id: Option<Uuid>,
    error_reason: Option<String>,
    cancel_requested: bool,
    submit_attempts: i32,
    poll_attempts: i32,
    store_attempts: i32,
    next_attempt_at: Option<Timestamp>,
    claimed_by: Option<String>,
    lease_expires_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl JobRow {
    fn into_job(self) -> Result<Job, StoreError> {
        let id = self.id;
        let corrupt = move |reason: String| StoreError::CorruptRecord { id, reason };
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e: CoreError| corrupt(e.to_string()))?;
        let kind: JobKind = self
            .kind
            .parse()
            .map_err(|e: CoreError| corrupt(e.to_string()))?;
        let params: JobParams = serde_json::from_value(self.params.clone())
            .map_err(|e| corrupt(format!("params: {e}")))?;

        Ok(Job {
            id: self.id,
            owner_id: self.owner_id,
            kind,
            params,
            status,
            token_cost: self.token_cost,
            external_id: self.external_id,
            asset_id: self.asset_id,
            error_reason: self.error_reason,
            cancel_requested: self.cancel_requested,
            submit_attempts: self.submit_attempts,
            poll_attempts: self.poll_attempts,
            store_attempts: self.store_attempts,
            next_attempt_at: self.next_attempt_at,
            claimed_by: self.claimed_by,
            lease_expires_at: self.lease_expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Job records in the `jobs` table.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let job = Job::from_new(new);
        let params = serde_json::to_value(&job.params)
            .map_err(|e| CoreError::Internal(format!("serialize params: {e}")))?;

        let query = format!(
            "INSERT INTO jobs \
                 (id, owner_id, kind, params, status, token_cost, cancel_requested, \
                  submit_attempts, poll_attempts, store_attempts, next_attempt_at, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job.id)
            .bind(job.owner_id)
            .bind(job.kind.as_str())
            .bind(&params)
            .bind(job.status.as_str())
            .bind(job.token_cost)
            .bind(job.cancel_requested)
            .bind(job.submit_attempts)
            .bind(job.poll_attempts)
            .bind(job.store_attempts)
            .bind(job.next_attempt_at)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await?;
        row.into_job()
    }

    async fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn list(
        &self,
        owner_id: OwnerId,
        query: &JobListQuery,
    ) -> Result<Vec<Job>, StoreError> {
        let limit = query.effective_limit();
        let rows = if let Some(status) = query.status {
            let sql = format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE owner_id = $1 AND status = $2 \
                 ORDER BY created_at DESC LIMIT $3"
            );
            sqlx::query_as::<_, JobRow>(&sql)
                .bind(owner_id)
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE owner_id = $1 \
                 ORDER BY created_at DESC LIMIT $2"
            );
            sqlx::query_as::<_, JobRow>(&sql)
                .bind(owner_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        changes: TransitionChanges,
    ) -> Result<Job, StoreError> {
        validate_transition(from, to)?;

        let query = format!(
            "UPDATE jobs SET \
                 status = $3, \
                 external_id = COALESCE($4, external_id), \
                 error_reason = COALESCE($5, error_reason), \
                 asset_id = COALESCE($6, asset_id), \
                 next_attempt_at = CASE WHEN $3 IN {TERMINAL_STATUSES} THEN NULL \
                     ELSE COALESCE($7, next_attempt_at) END, \
                 claimed_by = CASE WHEN $3 IN {TERMINAL_STATUSES} THEN NULL \
                     ELSE claimed_by END, \
                 lease_expires_at = CASE WHEN $3 IN {TERMINAL_STATUSES} THEN NULL \
                     ELSE lease_expires_at END, \
                 poll_attempts = CASE WHEN $3 = 'processing' THEN 0 \
                     ELSE poll_attempts END, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(changes.external_id)
            .bind(changes.error_reason)
            .bind(changes.asset_id)
            .bind(changes.next_attempt_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_job(),
            None => {
                // Lost the CAS, or the job does not exist at all.
                let current = self.find(id).await?.ok_or(StoreError::JobNotFound(id))?;
                Err(StoreError::TransitionConflict {
                    id,
                    expected: from,
                    found: current.status,
                })
            }
        }
    }

    async fn claim(
        &self,
        id: JobId,
        worker: &str,
        lease_ttl: Duration,
    ) -> Result<Option<Job>, StoreError> {
        let query = format!(
            "UPDATE jobs SET \
                 claimed_by = $2, \
                 lease_expires_at = NOW() + make_interval(secs => $3), \
                 updated_at = NOW() \
             WHERE id = $1 \
               AND status IN {ACTIVE_STATUSES} \
               AND (claimed_by IS NULL OR claimed_by = $2 OR lease_expires_at < NOW()) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(worker)
            .bind(lease_ttl.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.into_job()?)),
            None => {
                // Distinguish "someone else holds it" from "no such job".
                self.find(id).await?.ok_or(StoreError::JobNotFound(id))?;
                Ok(None)
            }
        }
    }

    async fn release(&self, id: JobId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET claimed_by = NULL, lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn record_submit_attempt(
        &self,
        id: JobId,
        next_attempt_at: Timestamp,
    ) -> Result<Job, StoreError> {
        let query = format!(
            "UPDATE jobs SET \
                 submit_attempts = submit_attempts + 1, \
                 next_attempt_at = $2, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(next_attempt_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::JobNotFound(id))?;
        row.into_job()
    }

    async fn record_poll_attempt(
        &self,
        id: JobId,
        next_attempt_at: Option<Timestamp>,
    ) -> Result<Job, StoreError> {
        let query = format!(
            "UPDATE jobs SET \
                 poll_attempts = poll_attempts + 1, \
                 next_attempt_at = $2, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(next_attempt_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::JobNotFound(id))?;
        row.into_job()
    }

    async fn record_store_attempt(&self, id: JobId) -> Result<Job, StoreError> {
        let query = format!(
            "UPDATE jobs SET store_attempts = store_attempts + 1, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::JobNotFound(id))?;
        row.into_job()
    }

    async fn request_cancel(&self, id: JobId) -> Result<Job, StoreError> {
        let query = format!(
            "UPDATE jobs SET cancel_requested = TRUE, updated_at = NOW() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_job(),
            None => {
                let current = self.find(id).await?.ok_or(StoreError::JobNotFound(id))?;
                Err(StoreError::TransitionConflict {
                    id,
                    expected: JobStatus::Processing,
                    found: current.status,
                })
            }
        }
    }

    async fn due_jobs(&self, now: Timestamp, limit: i64) -> Result<Vec<Job>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status IN {ACTIVE_STATUSES} \
               AND next_attempt_at IS NOT NULL \
               AND next_attempt_at <= $1 \
               AND (claimed_by IS NULL OR lease_expires_at < NOW()) \
             ORDER BY next_attempt_at ASC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}
