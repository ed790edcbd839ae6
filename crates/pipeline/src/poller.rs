//! Status poller: scans for due jobs and advances each one.
//!
//! The scan doubles as crash recovery. A `pending` job that comes due means
//! its dispatch was lost (process died, queue entry evaporated) and it goes
//! back on the queue; a `processing` job that comes due gets its status
//! checked against the provider. Both cases read their schedule from the
//! job row, so a restarted process resumes exactly where the last one
//! stopped.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use atelier_core::backoff;
use atelier_core::status::JobStatus;
use atelier_provider::{GenerationProvider, PollOutcome};
use atelier_store::models::job::Job;
use atelier_store::{JobStore, StoreError};

use crate::compensation::{settle_failure, CANCEL_REASON};
use crate::context::PipelineContext;
use crate::finalizer;

/// Run the poll loop until shutdown.
pub async fn run(ctx: Arc<PipelineContext>, shutdown: CancellationToken) {
    tracing::info!(
        scan_interval_ms = ctx.config.scan_interval.as_millis() as u64,
        "Poller starting"
    );
    let mut ticker = tokio::time::interval(ctx.config.scan_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = scan_once(&ctx).await {
                    tracing::error!(error = %err, "Poll scan failed");
                }
            }
        }
    }

    tracing::info!("Poller stopped");
}

/// One scan pass: fetch everything due and advance each job.
pub async fn scan_once(ctx: &PipelineContext) -> Result<(), StoreError> {
    let due = ctx
        .jobs
        .due_jobs(Utc::now(), ctx.config.scan_batch_size)
        .await?;

    for job in due {
        let job_id = job.id;
        if let Err(err) = advance(ctx, job).await {
            tracing::error!(job_id = %job_id, error = %err, "Poll step failed");
        }
    }
    Ok(())
}

/// Advance one due job according to its status.
async fn advance(ctx: &PipelineContext, job: Job) -> Result<(), StoreError> {
    match job.status {
        // Dispatch was lost or its retry came due; back on the queue. The
        // worker-side claim absorbs the duplicate if the original delivery
        // is still in flight.
        JobStatus::Pending => {
            tracing::debug!(job_id = %job.id, "Re-queueing due pending job");
            ctx.queue.push(job.id);
            Ok(())
        }
        JobStatus::Processing => poll_processing(ctx, job).await,
        // Terminal rows never come due; the scan filter excludes them.
        _ => Ok(()),
    }
}

/// Check a processing job against the provider and act on the answer.
async fn poll_processing(ctx: &PipelineContext, job: Job) -> Result<(), StoreError> {
    if job.cancel_requested {
        settle_failure(ctx, &job, JobStatus::Failed, CANCEL_REASON).await?;
        return Ok(());
    }

    let Some(external_id) = job.external_id.clone() else {
        // Unreachable through the normal flow; fail loudly rather than
        // polling nothing forever.
        tracing::error!(job_id = %job.id, "Processing job has no external id");
        settle_failure(ctx, &job, JobStatus::Failed, "Missing provider reference").await?;
        return Ok(());
    };

    let attempt = job.poll_attempts + 1;
    match ctx.provider.poll(job.kind, &external_id).await {
        Ok(PollOutcome::Succeeded { asset_url }) => {
            tracing::info!(job_id = %job.id, attempt, "Provider reports success");
            finalizer::finalize(ctx, &job, &asset_url).await
        }
        Ok(PollOutcome::Failed { reason }) => {
            tracing::warn!(job_id = %job.id, attempt, reason = %reason, "Provider reports failure");
            settle_failure(ctx, &job, JobStatus::Failed, &reason).await?;
            Ok(())
        }
        Ok(PollOutcome::Processing) => schedule_next_check(ctx, &job, attempt).await,
        Err(err) if err.is_transient() => {
            // A check that cannot reach the provider burns an attempt like
            // a busy answer; otherwise a dead provider polls forever.
            tracing::warn!(job_id = %job.id, attempt, error = %err, "Status check failed");
            schedule_next_check(ctx, &job, attempt).await
        }
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "Status check rejected");
            settle_failure(ctx, &job, JobStatus::Failed, &err.to_string()).await?;
            Ok(())
        }
    }
}

/// Count the attempt just made and either schedule the next check or, at
/// the ceiling, expire the job.
async fn schedule_next_check(
    ctx: &PipelineContext,
    job: &Job,
    attempt: i32,
) -> Result<(), StoreError> {
    let policy = &ctx.config.poll_policy;
    if attempt >= policy.max_attempts {
        tracing::warn!(job_id = %job.id, attempts = attempt, "Poll ceiling reached");
        settle_failure(ctx, job, JobStatus::Expired, "Generation timed out").await?;
        return Ok(());
    }

    let delay = backoff::with_jitter(backoff::delay_for_attempt(attempt + 1, policy), policy);
    let next = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
    ctx.jobs.record_poll_attempt(job.id, Some(next)).await?;
    tracing::debug!(
        job_id = %job.id,
        attempt,
        next_check_in_ms = delay.as_millis() as u64,
        "Next status check scheduled"
    );
    Ok(())
}
