//! Success finalization: turn a provider-side result into an owned asset.
//!
//! The provider hands back a download URL that it may garbage-collect at
//! any time, so completion means copying the bytes into our own blob
//! store, recording an asset row, and only then flipping the job to
//! `completed` and consuming the reservation. The steps run in that
//! order on purpose: a crash after the blob write but before the
//! transition leaves a job that is still `processing` and still due, and
//! the next poll re-runs finalization. The asset lookup at the top makes
//! that re-run cheap and keeps the whole function idempotent.

use atelier_core::backoff::MAX_STORE_ATTEMPTS;
use atelier_core::hashing;
use atelier_core::status::JobStatus;
use atelier_provider::{GenerationProvider, ProviderError};
use atelier_store::blob::BlobStore;
use atelier_store::models::asset::{Asset, NewAsset};
use atelier_store::models::job::{Job, TransitionChanges};
use atelier_store::{AssetStore, BlobError, JobStore, StoreError};

use crate::compensation::{consume_reservation, settle_failure};
use crate::context::PipelineContext;
use crate::events::JobEvent;

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// Persist the finished asset for `job` and settle the job as completed.
///
/// Persistence failures are counted against the job's store-attempt
/// budget and otherwise leave the row `processing` and due, so the next
/// scan retries. Once the budget is spent the job settles as failed and
/// the reservation is refunded.
pub async fn finalize(
    ctx: &PipelineContext,
    job: &Job,
    asset_url: &str,
) -> Result<(), StoreError> {
    let asset = match persist_asset(ctx, job, asset_url).await {
        Ok(asset) => asset,
        Err(err) => {
            let attempt = job.store_attempts + 1;
            if attempt >= MAX_STORE_ATTEMPTS {
                tracing::error!(
                    job_id = %job.id,
                    attempt,
                    error = %err,
                    "Asset persistence attempts exhausted"
                );
                settle_failure(ctx, job, JobStatus::Failed, "Could not persist finished asset")
                    .await?;
                return Ok(());
            }
            // The row stays processing and past due; the next scan finds
            // it, the provider reports success again, and this runs again.
            tracing::warn!(
                job_id = %job.id,
                attempt,
                error = %err,
                "Asset persistence failed; will retry"
            );
            ctx.jobs.record_store_attempt(job.id).await?;
            return Ok(());
        }
    };

    let changes = TransitionChanges {
        asset_id: Some(asset.id),
        ..Default::default()
    };
    match ctx
        .jobs
        .transition(job.id, JobStatus::Processing, JobStatus::Completed, changes)
        .await
    {
        Ok(_) => {
            consume_reservation(ctx, job).await;
            tracing::info!(
                job_id = %job.id,
                asset_id = %asset.id,
                url = %asset.url,
                "Job completed"
            );
            ctx.bus.publish(JobEvent::Completed {
                job_id: job.id,
                asset_id: asset.id,
            });
            Ok(())
        }
        Err(StoreError::TransitionConflict { found, .. }) => {
            // A cancel or expiry settled the job first. The asset row
            // stays behind as an orphan; the tokens follow the winner.
            tracing::warn!(job_id = %job.id, found = %found, "Completion lost the settlement race");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

// ---------------------------------------------------------------------------
// Asset persistence
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum PersistError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Download the asset and record it, reusing any row a previous attempt
/// already wrote.
async fn persist_asset(
    ctx: &PipelineContext,
    job: &Job,
    asset_url: &str,
) -> Result<Asset, PersistError> {
    // A previous attempt may have crashed between the insert and the
    // completed transition; pick its record back up without refetching.
    if let Some(existing) = ctx.assets.find_by_job(job.id).await? {
        tracing::debug!(job_id = %job.id, asset_id = %existing.id, "Asset already recorded");
        return Ok(existing);
    }

    let payload = ctx.provider.fetch_asset(asset_url).await?;
    let checksum = hashing::sha256_hex(&payload.bytes);
    let key = format!("{}/{}", job.owner_id, checksum);
    let url = ctx.blobs.put(&key, &payload.bytes, &payload.content_type).await?;

    let new = NewAsset {
        job_id: job.id,
        owner_id: job.owner_id,
        url,
        content_type: payload.content_type,
        size_bytes: payload.bytes.len() as i64,
        checksum_sha256: checksum,
    };
    match ctx.assets.insert(new).await {
        Ok(asset) => Ok(asset),
        Err(StoreError::DuplicateAsset(_)) => {
            // Another finalizer got here between our lookup and insert.
            match ctx.assets.find_by_job(job.id).await? {
                Some(asset) => Ok(asset),
                None => Err(PersistError::Store(StoreError::DuplicateAsset(job.id))),
            }
        }
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use atelier_core::params::JobParams;
    use atelier_provider::{FakeProvider, ProviderError};
    use atelier_store::memory::{MemoryAssetStore, MemoryJobStore, MemoryTokenLedger};
    use atelier_store::models::job::NewJob;
    use atelier_store::models::ledger::ReservationState;
    use atelier_store::blob::MemoryBlobStore;
    use atelier_store::TokenLedger;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::events::JobEventBus;
    use crate::queue::DispatchQueue;

    fn context_with(
        provider: Arc<FakeProvider>,
        blobs: Arc<MemoryBlobStore>,
    ) -> PipelineContext {
        PipelineContext {
            jobs: Arc::new(MemoryJobStore::new()),
            ledger: Arc::new(MemoryTokenLedger::new()),
            assets: Arc::new(MemoryAssetStore::new()),
            blobs,
            provider,
            queue: Arc::new(DispatchQueue::new()),
            bus: Arc::new(JobEventBus::default()),
            config: PipelineConfig::default(),
        }
    }

    fn params() -> JobParams {
        JobParams::Video {
            prompt: "a tide pool at dusk".to_string(),
            style: None,
            duration_secs: 4,
            resolution: "720p".to_string(),
        }
    }

    /// Seed a processing job with a live reservation, as the dispatcher
    /// leaves it.
    async fn processing_job(ctx: &PipelineContext) -> Job {
        let new = NewJob::new(7, params(), 50);
        ctx.ledger.grant(7, 500).await.unwrap();
        ctx.ledger.reserve(7, new.id, 50).await.unwrap();
        let job = ctx.jobs.create(new).await.unwrap();
        ctx.jobs
            .transition(
                job.id,
                JobStatus::Pending,
                JobStatus::Processing,
                TransitionChanges {
                    external_id: Some("ext-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    // -- success --

    #[tokio::test]
    async fn finalize_stores_the_asset_and_completes_the_job() {
        let provider =
            Arc::new(FakeProvider::new().with_asset(b"mp4 bytes".to_vec(), "video/mp4"));
        let blobs = Arc::new(MemoryBlobStore::new());
        let ctx = context_with(provider, blobs.clone());
        let job = processing_job(&ctx).await;

        finalize(&ctx, &job, "https://provider.test/out/1.mp4")
            .await
            .unwrap();

        let stored = ctx.jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);

        let asset = ctx.assets.find_by_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.asset_id, Some(asset.id));
        assert_eq!(asset.owner_id, 7);
        assert_eq!(asset.content_type, "video/mp4");
        assert_eq!(asset.size_bytes, 9);
        assert_eq!(blobs.len().await, 1);
        let (bytes, content_type) = blobs
            .get(&format!("7/{}", asset.checksum_sha256))
            .await
            .unwrap();
        assert_eq!(bytes, b"mp4 bytes");
        assert_eq!(content_type, "video/mp4");
    }

    #[tokio::test]
    async fn finalize_consumes_the_reservation() {
        let provider = Arc::new(FakeProvider::new());
        let ctx = context_with(provider, Arc::new(MemoryBlobStore::new()));
        let job = processing_job(&ctx).await;

        finalize(&ctx, &job, "https://provider.test/out/1.mp4")
            .await
            .unwrap();

        let reservation = ctx.ledger.reservation(job.id).await.unwrap().unwrap();
        assert_eq!(reservation.state, ReservationState::Consumed);
        let account = ctx.ledger.balance(7).await.unwrap();
        assert_eq!(account.balance_remaining, 450);
    }

    #[tokio::test]
    async fn finalize_publishes_completed() {
        let provider = Arc::new(FakeProvider::new());
        let ctx = context_with(provider, Arc::new(MemoryBlobStore::new()));
        let mut events = ctx.bus.subscribe();
        let job = processing_job(&ctx).await;

        finalize(&ctx, &job, "https://provider.test/out/1.mp4")
            .await
            .unwrap();

        let asset = ctx.assets.find_by_job(job.id).await.unwrap().unwrap();
        let event = tokio::time::timeout(Duration::from_millis(100), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_matches::assert_matches!(
            event,
            JobEvent::Completed { job_id, asset_id } if job_id == job.id && asset_id == asset.id
        );
    }

    // -- retries --

    #[tokio::test]
    async fn fetch_failure_counts_a_store_attempt() {
        let provider = Arc::new(FakeProvider::new());
        provider
            .fail_next_fetch(ProviderError::Transient("download reset".to_string()))
            .await;
        let ctx = context_with(provider.clone(), Arc::new(MemoryBlobStore::new()));
        let job = processing_job(&ctx).await;

        finalize(&ctx, &job, "https://provider.test/out/1.mp4")
            .await
            .unwrap();

        let stored = ctx.jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.store_attempts, 1);
        assert!(ctx.assets.find_by_job(job.id).await.unwrap().is_none());

        // The next pass succeeds.
        finalize(&ctx, &stored, "https://provider.test/out/1.mp4")
            .await
            .unwrap();
        let stored = ctx.jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.store_attempts, 1);
    }

    #[tokio::test]
    async fn exhausted_store_attempts_fail_the_job_and_refund() {
        let provider = Arc::new(FakeProvider::new());
        let ctx = context_with(provider.clone(), Arc::new(MemoryBlobStore::new()));
        let job = processing_job(&ctx).await;

        for _ in 0..MAX_STORE_ATTEMPTS {
            provider
                .fail_next_fetch(ProviderError::Transient("download reset".to_string()))
                .await;
            let current = ctx.jobs.find(job.id).await.unwrap().unwrap();
            finalize(&ctx, &current, "https://provider.test/out/1.mp4")
                .await
                .unwrap();
        }

        let stored = ctx.jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.store_attempts, MAX_STORE_ATTEMPTS - 1);
        assert_eq!(
            stored.error_reason.as_deref(),
            Some("Could not persist finished asset")
        );
        let account = ctx.ledger.balance(7).await.unwrap();
        assert_eq!(account.balance_remaining, 500);
    }

    // -- idempotency --

    #[tokio::test]
    async fn existing_asset_row_is_reused_without_refetching() {
        let provider = Arc::new(FakeProvider::new());
        let ctx = context_with(provider.clone(), Arc::new(MemoryBlobStore::new()));
        let job = processing_job(&ctx).await;

        // As if a previous run crashed after the insert.
        let asset = ctx
            .assets
            .insert(NewAsset {
                job_id: job.id,
                owner_id: job.owner_id,
                url: "memory://7/abc".to_string(),
                content_type: "video/mp4".to_string(),
                size_bytes: 3,
                checksum_sha256: "abc".to_string(),
            })
            .await
            .unwrap();

        finalize(&ctx, &job, "https://provider.test/out/1.mp4")
            .await
            .unwrap();

        assert_eq!(provider.fetch_count(), 0);
        let stored = ctx.jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.asset_id, Some(asset.id));
    }

    #[tokio::test]
    async fn settled_job_keeps_its_terminal_state() {
        let provider = Arc::new(FakeProvider::new());
        let ctx = context_with(provider, Arc::new(MemoryBlobStore::new()));
        let job = processing_job(&ctx).await;

        // A cancel settles the job while the asset download is in flight.
        ctx.jobs
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Failed,
                TransitionChanges {
                    error_reason: Some("Cancelled by user".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ctx.ledger.refund(job.id).await.unwrap();

        finalize(&ctx, &job, "https://provider.test/out/1.mp4")
            .await
            .unwrap();

        let stored = ctx.jobs.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        // The loser leaves the settled ledger alone.
        let account = ctx.ledger.balance(7).await.unwrap();
        assert_eq!(account.balance_remaining, 500);
    }
}
