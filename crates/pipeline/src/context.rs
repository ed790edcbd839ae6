//! Shared handles every pipeline component works against.

use std::sync::Arc;

use atelier_provider::GenerationProvider;
use atelier_store::blob::BlobStore;
use atelier_store::{AssetStore, JobStore, TokenLedger};

use crate::config::PipelineConfig;
use crate::events::JobEventBus;
use crate::queue::DispatchQueue;

/// Bundle of stores, the provider adapter, the dispatch queue, and the
/// event bus, shared by the service, workers, poller, and finalizer.
///
/// Everything is trait-object based so the same pipeline runs against the
/// Postgres stores in production and the in-memory ones in tests.
pub struct PipelineContext {
    pub jobs: Arc<dyn JobStore>,
    pub ledger: Arc<dyn TokenLedger>,
    pub assets: Arc<dyn AssetStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub provider: Arc<dyn GenerationProvider>,
    pub queue: Arc<DispatchQueue>,
    pub bus: Arc<JobEventBus>,
    pub config: PipelineConfig,
}
