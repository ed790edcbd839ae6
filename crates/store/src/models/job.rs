//! Job record and DTOs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::params::{JobKind, JobParams};
use atelier_core::status::JobStatus;
use atelier_core::types::{AssetId, JobId, OwnerId, Timestamp};

/// Maximum page size for job listing.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// A persisted generation job.
///
/// Retry counters and `next_attempt_at` live on the record rather than in
/// worker memory, so a process restart resumes the schedule instead of
/// orphaning in-flight jobs.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub kind: JobKind,
    pub params: JobParams,
    pub status: JobStatus,
    /// Priced once at submission; refunds always release exactly this amount.
    pub token_cost: i64,
    /// Provider-side reference, set when the submit succeeds.
    pub external_id: Option<String>,
    pub asset_id: Option<AssetId>,
    pub error_reason: Option<String>,
    /// Set while processing; honored by the poller before its next check.
    pub cancel_requested: bool,
    pub submit_attempts: i32,
    pub poll_attempts: i32,
    pub store_attempts: i32,
    /// When the job next becomes eligible for dispatch or polling.
    pub next_attempt_at: Option<Timestamp>,
    pub claimed_by: Option<String>,
    pub lease_expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Build a fresh pending job from a submission.
    pub fn from_new(new: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: new.id,
            owner_id: new.owner_id,
            kind: new.params.kind(),
            params: new.params,
            status: JobStatus::Pending,
            token_cost: new.token_cost,
            external_id: None,
            asset_id: None,
            error_reason: None,
            cancel_requested: false,
            submit_attempts: 0,
            poll_attempts: 0,
            store_attempts: 0,
            next_attempt_at: Some(now),
            claimed_by: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the job has reached a state with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Input for creating a job.
///
/// The id is assigned up front, before the row exists, because the token
/// reservation is keyed by job id and must be taken first.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub params: JobParams,
    pub token_cost: i64,
}

impl NewJob {
    /// Assign a fresh id to a submission.
    pub fn new(owner_id: OwnerId, params: JobParams, token_cost: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            params,
            token_cost,
        }
    }
}

/// Field updates applied atomically with a status transition.
///
/// `None` leaves the column untouched. Clearing of `next_attempt_at` and the
/// lease on terminal transitions, and the poll-counter reset on entry to
/// `processing`, are store invariants rather than caller choices.
#[derive(Debug, Clone, Default)]
pub struct TransitionChanges {
    pub external_id: Option<String>,
    pub error_reason: Option<String>,
    pub asset_id: Option<AssetId>,
    pub next_attempt_at: Option<Timestamp>,
}

/// Query parameters for job listing.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (e.g. `processing`, `failed`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 20, capped at 100.
    pub limit: Option<i64>,
}

impl JobListQuery {
    /// The limit to apply after defaulting and capping.
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}
