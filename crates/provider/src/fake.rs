//! Scripted in-process provider for tests and keyless local runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use atelier_core::params::{JobKind, JobParams};

use crate::adapter::{AssetPayload, GenerationProvider, PollOutcome, ProviderError, SubmitAck};

/// [`GenerationProvider`] that serves outcomes from an in-process script.
///
/// Poll outcomes are consumed from a queue; once the queue runs dry every
/// further poll reports the configured fallback. The fallback defaults to
/// [`PollOutcome::Processing`], so an unscripted provider looks permanently
/// busy, which is what backoff and expiry tests need. Submit and fetch
/// failures can be queued the same way. Also used as the runtime provider
/// when no API key is configured, via [`FakeProvider::always_succeeding`].
pub struct FakeProvider {
    outcomes: Mutex<VecDeque<PollOutcome>>,
    fallback: PollOutcome,
    submit_errors: Mutex<VecDeque<ProviderError>>,
    poll_errors: Mutex<VecDeque<ProviderError>>,
    fetch_errors: Mutex<VecDeque<ProviderError>>,
    asset_bytes: Vec<u8>,
    content_type: String,
    submits: AtomicUsize,
    polls: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeProvider {
    /// Provider with an empty script: accepts every submit, reports
    /// `Processing` forever.
    pub fn new() -> Self {
        Self::with_fallback(PollOutcome::Processing)
    }

    /// Provider that reports success on the first poll of every job.
    /// Used for local runs without provider credentials.
    pub fn always_succeeding() -> Self {
        Self::with_fallback(PollOutcome::Succeeded {
            asset_url: "fake://assets/ready".to_string(),
        })
    }

    fn with_fallback(fallback: PollOutcome) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback,
            submit_errors: Mutex::new(VecDeque::new()),
            poll_errors: Mutex::new(VecDeque::new()),
            fetch_errors: Mutex::new(VecDeque::new()),
            asset_bytes: b"fake asset bytes".to_vec(),
            content_type: "video/mp4".to_string(),
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Replace the payload served by `fetch_asset`.
    pub fn with_asset(mut self, bytes: Vec<u8>, content_type: &str) -> Self {
        self.asset_bytes = bytes;
        self.content_type = content_type.to_string();
        self
    }

    /// Append a poll outcome to the script.
    pub async fn queue_outcome(&self, outcome: PollOutcome) {
        self.outcomes.lock().await.push_back(outcome);
    }

    /// Make the next submit call fail with the given error.
    pub async fn fail_next_submit(&self, err: ProviderError) {
        self.submit_errors.lock().await.push_back(err);
    }

    /// Make the next status check fail with the given error.
    pub async fn fail_next_poll(&self, err: ProviderError) {
        self.poll_errors.lock().await.push_back(err);
    }

    /// Make the next asset download fail with the given error.
    pub async fn fail_next_fetch(&self, err: ProviderError) {
        self.fetch_errors.lock().await.push_back(err);
    }

    /// Number of submit calls accepted or rejected so far.
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    /// Number of status checks served so far.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Number of asset downloads served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GenerationProvider for FakeProvider {
    async fn submit(&self, params: &JobParams) -> Result<SubmitAck, ProviderError> {
        let sequence = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self.submit_errors.lock().await.pop_front() {
            return Err(err);
        }
        Ok(SubmitAck {
            external_id: format!("fake-{}-{sequence}", params.kind()),
        })
    }

    async fn poll(&self, _kind: JobKind, _external_id: &str) -> Result<PollOutcome, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.poll_errors.lock().await.pop_front() {
            return Err(err);
        }
        let scripted = self.outcomes.lock().await.pop_front();
        Ok(scripted.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn fetch_asset(&self, _url: &str) -> Result<AssetPayload, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_errors.lock().await.pop_front() {
            return Err(err);
        }
        Ok(AssetPayload {
            bytes: self.asset_bytes.clone(),
            content_type: self.content_type.clone(),
        })
    }
}
