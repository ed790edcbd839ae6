//! Poll scheduling and retry budgets for in-flight jobs.
//!
//! Upstream generation takes anywhere from seconds to many minutes, so
//! status checks back off exponentially up to a hard cap, with jitter so
//! jobs submitted in a burst do not poll in lockstep. Attempt counters and
//! the computed next-check time are persisted on the job record; everything
//! here is pure arithmetic.

use std::time::Duration;

use rand::Rng;

// ---------------------------------------------------------------------------
// Retry budgets
// ---------------------------------------------------------------------------

/// Status checks allowed before an unanswered job is declared expired.
pub const MAX_POLL_ATTEMPTS: i32 = 10;

/// Submit attempts allowed before a job that cannot reach the provider fails.
pub const MAX_SUBMIT_ATTEMPTS: i32 = 3;

/// Attempts allowed to persist a finished asset before the job fails.
pub const MAX_STORE_ATTEMPTS: i32 = 3;

/// Delay before re-submitting after a transient provider error.
pub const SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Poll policy
// ---------------------------------------------------------------------------

/// Tunable parameters for the poll-backoff strategy.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay before the first status check after submission.
    pub initial_delay: Duration,
    /// Upper bound on the delay between checks.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each check.
    pub multiplier: f64,
    /// Jitter half-width as a fraction of the delay (0.2 = plus/minus 20%).
    pub jitter: f64,
    /// Checks allowed before the job expires.
    pub max_attempts: i32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(15),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

/// Base delay before poll attempt `attempt` (1-based), before jitter.
///
/// Attempt 1 waits `initial_delay`; each later attempt grows by `multiplier`
/// and is clamped to `max_delay`. Derived from the persisted attempt counter
/// rather than the previous delay, so a restarted process lands back on the
/// same schedule.
pub fn delay_for_attempt(attempt: i32, policy: &PollPolicy) -> Duration {
    let exp = attempt.max(1) - 1;
    let base_ms = policy.initial_delay.as_millis() as f64 * policy.multiplier.powi(exp);
    let capped_ms = base_ms.min(policy.max_delay.as_millis() as f64);
    Duration::from_millis(capped_ms as u64)
}

/// Apply plus/minus `policy.jitter` to a base delay.
pub fn with_jitter(base: Duration, policy: &PollPolicy) -> Duration {
    if policy.jitter <= 0.0 {
        return base;
    }
    let spread = rand::rng().random_range(-policy.jitter..=policy.jitter);
    let ms = base.as_millis() as f64 * (1.0 + spread);
    Duration::from_millis(ms.max(0.0) as u64)
}
