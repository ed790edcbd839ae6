//! In-memory [`JobStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use atelier_core::status::{validate_transition, JobStatus};
use atelier_core::types::{JobId, OwnerId, Timestamp};

use crate::error::StoreError;
use crate::models::job::{Job, JobListQuery, NewJob, TransitionChanges};
use crate::traits::JobStore;

/// Job records in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let job = Job::from_new(new);
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn list(
        &self,
        owner_id: OwnerId,
        query: &JobListQuery,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.owner_id == owner_id)
            .filter(|job| query.status.is_none_or(|status| job.status == status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(query.effective_limit() as usize);
        Ok(matching)
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        changes: TransitionChanges,
    ) -> Result<Job, StoreError> {
        validate_transition(from, to)?;

        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if job.status != from {
            return Err(StoreError::TransitionConflict {
                id,
                expected: from,
                found: job.status,
            });
        }

        job.status = to;
        if let Some(external_id) = changes.external_id {
            job.external_id = Some(external_id);
        }
        if let Some(reason) = changes.error_reason {
            job.error_reason = Some(reason);
        }
        if let Some(asset_id) = changes.asset_id {
            job.asset_id = Some(asset_id);
        }
        if let Some(at) = changes.next_attempt_at {
            job.next_attempt_at = Some(at);
        }
        if to == JobStatus::Processing {
            job.poll_attempts = 0;
        }
        if to.is_terminal() {
            job.next_attempt_at = None;
            job.claimed_by = None;
            job.lease_expires_at = None;
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn claim(
        &self,
        id: JobId,
        worker: &str,
        lease_ttl: Duration,
    ) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if job.is_terminal() {
            return Ok(None);
        }

        let now = Utc::now();
        let held_by_other = job.claimed_by.as_deref().is_some_and(|holder| {
            holder != worker && job.lease_expires_at.is_some_and(|at| at > now)
        });
        if held_by_other {
            return Ok(None);
        }

        job.claimed_by = Some(worker.to_string());
        job.lease_expires_at = Some(now + chrono::Duration::milliseconds(lease_ttl.as_millis() as i64));
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn release(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.claimed_by = None;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn record_submit_attempt(
        &self,
        id: JobId,
        next_attempt_at: Timestamp,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.submit_attempts += 1;
        job.next_attempt_at = Some(next_attempt_at);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn record_poll_attempt(
        &self,
        id: JobId,
        next_attempt_at: Option<Timestamp>,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.poll_attempts += 1;
        job.next_attempt_at = next_attempt_at;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn record_store_attempt(&self, id: JobId) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.store_attempts += 1;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn request_cancel(&self, id: JobId) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if job.status != JobStatus::Processing {
            return Err(StoreError::TransitionConflict {
                id,
                expected: JobStatus::Processing,
                found: job.status,
            });
        }
        job.cancel_requested = true;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn due_jobs(&self, now: Timestamp, limit: i64) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut due: Vec<Job> = jobs
            .values()
            .filter(|job| !job.is_terminal())
            .filter(|job| job.next_attempt_at.is_some_and(|at| at <= now))
            .filter(|job| {
                job.claimed_by.is_none() || job.lease_expires_at.is_some_and(|at| at < now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|job| job.next_attempt_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}
