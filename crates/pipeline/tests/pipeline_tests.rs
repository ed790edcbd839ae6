//! End-to-end pipeline tests over the in-memory stores and the fake
//! provider: submission through dispatch, polling, finalization, and the
//! failure settlements, with the real worker tasks running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use atelier_core::params::JobParams;
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;
use atelier_pipeline::queue::DispatchQueue;
use atelier_pipeline::{
    JobEvent, JobEventBus, JobService, PipelineConfig, PipelineContext, PipelineRuntime,
};
use atelier_provider::{FakeProvider, PollOutcome, ProviderError};
use atelier_store::blob::MemoryBlobStore;
use atelier_store::memory::{MemoryAssetStore, MemoryJobStore, MemoryTokenLedger};
use atelier_store::models::job::{NewJob, TransitionChanges};
use atelier_store::models::ledger::ReservationState;
use atelier_store::{AssetStore, JobStore, TokenLedger};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Pipeline {
    ctx: Arc<PipelineContext>,
    service: JobService,
    provider: Arc<FakeProvider>,
    blobs: Arc<MemoryBlobStore>,
}

/// Millisecond-scale timings so a full lifecycle fits in a test run.
fn fast_config(max_attempts: i32) -> PipelineConfig {
    let mut config = PipelineConfig {
        worker_count: 2,
        scan_interval: Duration::from_millis(5),
        submit_retry_delay: Duration::from_millis(5),
        ..Default::default()
    };
    config.poll_policy.initial_delay = Duration::from_millis(5);
    config.poll_policy.max_delay = Duration::from_millis(10);
    config.poll_policy.jitter = 0.0;
    config.poll_policy.max_attempts = max_attempts;
    config
}

fn pipeline_with(provider: FakeProvider, config: PipelineConfig) -> Pipeline {
    let provider = Arc::new(provider);
    let blobs = Arc::new(MemoryBlobStore::new());
    let ctx = Arc::new(PipelineContext {
        jobs: Arc::new(MemoryJobStore::new()),
        ledger: Arc::new(MemoryTokenLedger::new()),
        assets: Arc::new(MemoryAssetStore::new()),
        blobs: blobs.clone(),
        provider: provider.clone(),
        queue: Arc::new(DispatchQueue::new()),
        bus: Arc::new(JobEventBus::default()),
        config,
    });
    Pipeline {
        service: JobService::new(ctx.clone()),
        ctx,
        provider,
        blobs,
    }
}

fn video_params() -> JobParams {
    JobParams::Video {
        prompt: "a storm rolling over open water".to_string(),
        style: None,
        duration_secs: 4,
        resolution: "720p".to_string(),
    }
}

/// Wait for the first event about `job_id` that `accept` matches.
async fn wait_for(
    events: &mut broadcast::Receiver<JobEvent>,
    job_id: JobId,
    accept: impl Fn(&JobEvent) -> bool,
) -> JobEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for a pipeline event")
            .expect("event bus closed");
        if event.job_id() == job_id && accept(&event) {
            return event;
        }
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

/// A submission runs the full lifecycle: dispatched, polled while the
/// provider is busy, then completed with the asset copied into our own
/// storage and the reservation consumed.
#[tokio::test]
async fn submitted_job_flows_to_completed() {
    let provider = FakeProvider::new().with_asset(b"final render".to_vec(), "video/mp4");
    let pipeline = pipeline_with(provider, fast_config(10));
    pipeline.provider.queue_outcome(PollOutcome::Processing).await;
    pipeline
        .provider
        .queue_outcome(PollOutcome::Succeeded {
            asset_url: "https://provider.test/out/42.mp4".to_string(),
        })
        .await;
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Completed { .. })
    })
    .await;
    runtime.shutdown().await;

    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.external_id.is_some());

    let asset = pipeline.ctx.assets.find_by_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.asset_id, Some(asset.id));
    assert_eq!(asset.content_type, "video/mp4");
    assert_eq!(asset.size_bytes, 12);
    assert_eq!(pipeline.blobs.len().await, 1);

    let account = pipeline.service.balance(1).await.unwrap();
    assert_eq!(account.balance_remaining, 400);
    let reservation = pipeline.ctx.ledger.reservation(job.id).await.unwrap().unwrap();
    assert_eq!(reservation.state, ReservationState::Consumed);
    assert!(pipeline.provider.poll_count() >= 2);
}

// ---------------------------------------------------------------------------
// Submit failures
// ---------------------------------------------------------------------------

/// A permanent provider rejection settles the job immediately and gives
/// the tokens back.
#[tokio::test]
async fn permanent_submit_rejection_fails_and_refunds() {
    let pipeline = pipeline_with(FakeProvider::new(), fast_config(10));
    pipeline
        .provider
        .fail_next_submit(ProviderError::Permanent(
            "Provider API error (400): unsupported resolution".to_string(),
        ))
        .await;
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Failed { .. })
    })
    .await;
    runtime.shutdown().await;

    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_reason.unwrap().contains("400"));
    assert_eq!(pipeline.provider.submit_count(), 1);

    let account = pipeline.service.balance(1).await.unwrap();
    assert_eq!(account.balance_remaining, 500);
    let reservation = pipeline.ctx.ledger.reservation(job.id).await.unwrap().unwrap();
    assert_eq!(reservation.state, ReservationState::Refunded);
}

/// A transient submit failure is retried after a delay, and the retry
/// carries the job through to completion.
#[tokio::test]
async fn transient_submit_failure_is_retried() {
    let pipeline = pipeline_with(FakeProvider::new(), fast_config(10));
    pipeline
        .provider
        .fail_next_submit(ProviderError::Transient("connect timeout".to_string()))
        .await;
    pipeline
        .provider
        .queue_outcome(PollOutcome::Succeeded {
            asset_url: "https://provider.test/out/7.mp4".to_string(),
        })
        .await;
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Completed { .. })
    })
    .await;
    runtime.shutdown().await;

    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.submit_attempts, 1);
    assert_eq!(pipeline.provider.submit_count(), 2);
}

// ---------------------------------------------------------------------------
// Poll outcomes
// ---------------------------------------------------------------------------

/// The provider reporting failure settles the job with the provider's
/// reason and refunds.
#[tokio::test]
async fn provider_reported_failure_refunds() {
    let pipeline = pipeline_with(FakeProvider::new(), fast_config(10));
    pipeline
        .provider
        .queue_outcome(PollOutcome::Failed {
            reason: "content policy rejection".to_string(),
        })
        .await;
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    let event = wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Failed { .. })
    })
    .await;
    runtime.shutdown().await;

    assert!(matches!(
        event,
        JobEvent::Failed { reason, .. } if reason == "content policy rejection"
    ));
    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_reason.as_deref(),
        Some("content policy rejection")
    );
    let account = pipeline.service.balance(1).await.unwrap();
    assert_eq!(account.balance_remaining, 500);
}

/// A provider that never answers runs out of poll attempts; the job
/// expires and the hold is released exactly once.
#[tokio::test]
async fn stalled_job_expires_at_the_poll_ceiling() {
    let pipeline = pipeline_with(FakeProvider::new(), fast_config(3));
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Expired { .. })
    })
    .await;
    runtime.shutdown().await;

    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Expired);
    assert_eq!(stored.error_reason.as_deref(), Some("Generation timed out"));
    assert_eq!(pipeline.provider.poll_count(), 3);

    let account = pipeline.service.balance(1).await.unwrap();
    assert_eq!(account.balance_remaining, 500);
    let reservation = pipeline.ctx.ledger.reservation(job.id).await.unwrap().unwrap();
    assert_eq!(reservation.state, ReservationState::Refunded);
}

/// Cancelling a processing job flips the flag; the poller settles it on
/// the next pass instead of checking the provider again.
#[tokio::test]
async fn cancel_during_processing_is_honored() {
    let pipeline = pipeline_with(FakeProvider::new(), fast_config(10));
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Dispatched { .. })
    })
    .await;
    pipeline.service.cancel(job.id).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Failed { .. })
    })
    .await;
    runtime.shutdown().await;

    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_reason.as_deref(), Some("Cancelled by user"));
    let account = pipeline.service.balance(1).await.unwrap();
    assert_eq!(account.balance_remaining, 500);
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// A failed asset download leaves the job processing; the next poll pass
/// retries the whole persistence step and completes.
#[tokio::test]
async fn asset_download_failure_is_retried() {
    let provider =
        FakeProvider::always_succeeding().with_asset(b"render".to_vec(), "video/mp4");
    let pipeline = pipeline_with(provider, fast_config(10));
    pipeline
        .provider
        .fail_next_fetch(ProviderError::Transient("download reset".to_string()))
        .await;
    let mut events = pipeline.ctx.bus.subscribe();
    let runtime = PipelineRuntime::start(pipeline.ctx.clone());

    pipeline.service.grant(1, 500).await.unwrap();
    let job = pipeline.service.submit(1, video_params()).await.unwrap();

    wait_for(&mut events, job.id, |event| {
        matches!(event, JobEvent::Completed { .. })
    })
    .await;
    runtime.shutdown().await;

    let stored = pipeline.service.get(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.store_attempts, 1);
    assert_eq!(pipeline.provider.fetch_count(), 2);

    let reservation = pipeline.ctx.ledger.reservation(job.id).await.unwrap().unwrap();
    assert_eq!(reservation.state, ReservationState::Consumed);
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

/// A terminal job whose reservation is still open is what a process that
/// died between the status write and the refund leaves behind. Starting
/// the runtime must release the hold without any new submission.
#[tokio::test]
async fn startup_releases_a_hold_lost_before_restart() {
    let mut config = fast_config(10);
    config.reconcile_interval = Duration::from_millis(5);
    let pipeline = pipeline_with(FakeProvider::new(), config);

    pipeline.ctx.ledger.grant(1, 500).await.unwrap();
    let new = NewJob::new(1, video_params(), 100);
    pipeline.ctx.ledger.reserve(1, new.id, 100).await.unwrap();
    let job = pipeline.ctx.jobs.create(new).await.unwrap();
    pipeline
        .ctx
        .jobs
        .transition(
            job.id,
            JobStatus::Pending,
            JobStatus::Failed,
            TransitionChanges {
                error_reason: Some("Provider rejected the request".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let runtime = PipelineRuntime::start(pipeline.ctx.clone());
    let refunded = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let reservation = pipeline
                .ctx
                .ledger
                .reservation(job.id)
                .await
                .unwrap()
                .unwrap();
            if reservation.state == ReservationState::Refunded {
                break reservation;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("the reconciler did not release the hold");
    runtime.shutdown().await;

    assert_eq!(refunded.amount, 100);
    let account = pipeline.ctx.ledger.balance(1).await.unwrap();
    assert_eq!(account.balance_remaining, 500);
}
