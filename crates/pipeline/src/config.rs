//! Tunables for the dispatch and polling machinery.

use std::time::Duration;

use atelier_core::backoff::{PollPolicy, SUBMIT_RETRY_DELAY};

/// Runtime knobs for the pipeline. [`Default`] carries production values;
/// tests shrink the delays to milliseconds.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dispatch workers consuming the submit queue.
    pub worker_count: usize,
    /// How long a claimed job belongs to one worker before the lease can
    /// be reclaimed.
    pub lease_ttl: Duration,
    /// How often the poller scans for due jobs.
    pub scan_interval: Duration,
    /// How many due jobs one scan may pick up.
    pub scan_batch_size: i64,
    /// Backoff schedule for provider status checks.
    pub poll_policy: PollPolicy,
    /// Delay before a transient submit failure is retried.
    pub submit_retry_delay: Duration,
    /// How often the settlement reconciler sweeps for reservations left
    /// open by an interrupted settlement.
    pub reconcile_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            lease_ttl: Duration::from_secs(120),
            scan_interval: Duration::from_secs(2),
            scan_batch_size: 50,
            poll_policy: PollPolicy::default(),
            submit_retry_delay: SUBMIT_RETRY_DELAY,
            reconcile_interval: Duration::from_secs(60),
        }
    }
}
