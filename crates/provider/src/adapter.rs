//! Provider-facing trait and the types that cross it.

use async_trait::async_trait;
use atelier_core::params::{JobKind, JobParams};

/// Acknowledgement returned by the provider after accepting a generation
/// request.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// Provider-assigned identifier used for all later status checks.
    pub external_id: String,
}

/// Result of a single status check against the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Generation is still running; check again later.
    Processing,
    /// Generation finished; the asset is downloadable at the given URL.
    Succeeded { asset_url: String },
    /// Generation failed on the provider side.
    Failed { reason: String },
}

/// Downloaded asset bytes plus the content type the provider reported.
#[derive(Debug, Clone)]
pub struct AssetPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Errors surfaced by a provider adapter, pre-classified for retry handling.
///
/// `Transient` covers connectivity problems, timeouts, rate limiting, and
/// provider-side 5xx responses. `Permanent` covers everything a retry of
/// the same request cannot fix (rejected parameters, unknown ids).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Retrying the same request later may succeed.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Retrying will not help; the request itself was rejected.
    #[error("Permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// A remote generation service.
///
/// Implementations must be shareable across worker tasks; all state is
/// interior.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a generation request, returning the provider-side id used
    /// for polling.
    async fn submit(&self, params: &JobParams) -> Result<SubmitAck, ProviderError>;

    /// Check the state of a previously submitted request. Status endpoints
    /// are scoped by kind, so the kind travels with the provider id.
    async fn poll(&self, kind: JobKind, external_id: &str) -> Result<PollOutcome, ProviderError>;

    /// Download a finished asset from the URL a successful poll reported.
    async fn fetch_asset(&self, url: &str) -> Result<AssetPayload, ProviderError>;
}
