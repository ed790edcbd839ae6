//! Dispatch queue feeding the submit workers.
//!
//! A single global FIFO: jobs are pushed at submission (or re-pushed by the
//! recovery scan and retry timers) and consumed by the dispatch worker
//! pool. Delivery is at-least-once; the store-side lease, not the queue,
//! is what keeps two workers off the same job.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use atelier_core::types::JobId;

/// Unbounded multi-producer queue of job ids awaiting dispatch.
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<JobId>,
    rx: Mutex<mpsc::UnboundedReceiver<JobId>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Queue a job for immediate dispatch.
    pub fn push(&self, job_id: JobId) {
        // SendError only means the consumer side is gone (shutdown); the
        // recovery scan will find the job again on next startup.
        let _ = self.tx.send(job_id);
    }

    /// Queue a job after a delay, without blocking the caller.
    ///
    /// The timer lives in a spawned task and does not survive a restart;
    /// the persisted `next_attempt_at` on the job row is what makes the
    /// retry durable.
    pub fn push_after(&self, job_id: JobId, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(job_id);
        });
    }

    /// Wait for the next queued job.
    ///
    /// Workers call this concurrently; the internal lock hands each queued
    /// id to exactly one of them.
    pub async fn next(&self) -> Option<JobId> {
        self.rx.lock().await.recv().await
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}
