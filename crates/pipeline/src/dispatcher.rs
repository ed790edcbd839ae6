//! Dispatch workers: drain the queue and hand jobs to the provider.
//!
//! The queue delivers at-least-once, so every delivery starts with a store
//! lease claim; duplicates and stale entries fall out there. A successful
//! submit moves the job to `processing` with its first poll already
//! scheduled, after which the poller owns it.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use atelier_core::backoff::{self, MAX_SUBMIT_ATTEMPTS};
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;
use atelier_provider::{GenerationProvider, ProviderError, SubmitAck};
use atelier_store::models::job::{Job, TransitionChanges};
use atelier_store::{JobStore, StoreError};

use crate::compensation::settle_failure;
use crate::context::PipelineContext;
use crate::events::JobEvent;

/// Run one dispatch worker until shutdown or queue closure.
pub async fn run(ctx: Arc<PipelineContext>, worker: String, shutdown: CancellationToken) {
    tracing::info!(worker = %worker, "Dispatch worker starting");

    loop {
        let job_id = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = ctx.queue.next() => match next {
                Some(id) => id,
                None => break,
            },
        };

        if let Err(err) = dispatch_one(&ctx, &worker, job_id).await {
            tracing::error!(job_id = %job_id, worker = %worker, error = %err, "Dispatch failed");
        }
    }

    tracing::info!(worker = %worker, "Dispatch worker stopped");
}

/// Claim and submit a single queued job.
///
/// A failed claim or a job that already left `pending` is a no-op; the
/// queue redelivers freely and this is where duplicates die.
pub async fn dispatch_one(
    ctx: &PipelineContext,
    worker: &str,
    job_id: JobId,
) -> Result<(), StoreError> {
    let Some(job) = ctx.jobs.claim(job_id, worker, ctx.config.lease_ttl).await? else {
        tracing::debug!(job_id = %job_id, worker = %worker, "Job claimed elsewhere, skipping");
        return Ok(());
    };

    if job.status != JobStatus::Pending {
        ctx.jobs.release(job_id).await?;
        return Ok(());
    }

    let outcome = submit_job(ctx, &job).await;
    // The lease only covers the submit window. Polling is schedule-driven
    // and must not find the row held.
    ctx.jobs.release(job_id).await?;
    outcome
}

async fn submit_job(ctx: &PipelineContext, job: &Job) -> Result<(), StoreError> {
    match ctx.provider.submit(&job.params).await {
        Ok(ack) => mark_dispatched(ctx, job, ack).await,
        Err(err) if err.is_transient() => retry_submit(ctx, job, err).await,
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "Provider rejected submission");
            settle_failure(ctx, job, JobStatus::Failed, &err.to_string()).await?;
            Ok(())
        }
    }
}

/// Record the provider ack: `pending -> processing` with the external id
/// and the first status check scheduled.
async fn mark_dispatched(
    ctx: &PipelineContext,
    job: &Job,
    ack: SubmitAck,
) -> Result<(), StoreError> {
    let policy = &ctx.config.poll_policy;
    let first_check = backoff::with_jitter(policy.initial_delay, policy);
    let changes = TransitionChanges {
        external_id: Some(ack.external_id.clone()),
        next_attempt_at: Some(Utc::now() + chrono::Duration::milliseconds(first_check.as_millis() as i64)),
        ..Default::default()
    };

    match ctx
        .jobs
        .transition(job.id, JobStatus::Pending, JobStatus::Processing, changes)
        .await
    {
        Ok(_) => {
            tracing::info!(job_id = %job.id, external_id = %ack.external_id, "Job dispatched");
            ctx.bus.publish(JobEvent::Dispatched {
                job_id: job.id,
                external_id: ack.external_id,
            });
            Ok(())
        }
        Err(StoreError::TransitionConflict { found, .. }) => {
            // Cancelled between claim and submit; the canceller settled the
            // tokens. The provider-side render is orphaned but harmless.
            tracing::warn!(job_id = %job.id, found = %found, "Job moved during submit");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Count a transient submit failure and either schedule the retry or give
/// up and settle.
async fn retry_submit(
    ctx: &PipelineContext,
    job: &Job,
    err: ProviderError,
) -> Result<(), StoreError> {
    let attempt = job.submit_attempts + 1;
    if attempt >= MAX_SUBMIT_ATTEMPTS {
        tracing::error!(job_id = %job.id, attempt, error = %err, "Submit retries exhausted");
        settle_failure(ctx, job, JobStatus::Failed, &err.to_string()).await?;
        return Ok(());
    }

    let delay = ctx.config.submit_retry_delay;
    let retry_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
    ctx.jobs.record_submit_attempt(job.id, retry_at).await?;
    ctx.queue.push_after(job.id, delay);
    tracing::warn!(
        job_id = %job.id,
        attempt,
        retry_in_secs = delay.as_secs(),
        error = %err,
        "Transient submit failure, retry scheduled"
    );
    Ok(())
}
