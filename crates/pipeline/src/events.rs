//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`JobEventBus`] is the publish/subscribe hub for job lifecycle events.
//! It is shared via `Arc<JobEventBus>` across the pipeline components and
//! the API layer; tests subscribe to observe the pipeline without polling
//! the store.

use tokio::sync::broadcast;

use atelier_core::params::JobKind;
use atelier_core::types::{AssetId, JobId, OwnerId};

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A lifecycle notification for one job.
///
/// Events are emitted after the corresponding store write succeeds, so a
/// subscriber that reads the job on receipt sees the new state.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Tokens reserved and the job row created.
    Submitted {
        job_id: JobId,
        owner_id: OwnerId,
        kind: JobKind,
        token_cost: i64,
    },
    /// The provider accepted the request.
    Dispatched { job_id: JobId, external_id: String },
    /// Asset persisted and the job closed out.
    Completed { job_id: JobId, asset_id: AssetId },
    /// The job failed; its reservation has been released.
    Failed { job_id: JobId, reason: String },
    /// The poll ceiling passed without an answer; reservation released.
    Expired { job_id: JobId },
}

impl JobEvent {
    /// The job this event is about.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Submitted { job_id, .. }
            | JobEvent::Dispatched { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Expired { job_id } => *job_id,
        }
    }
}

// ---------------------------------------------------------------------------
// JobEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`JobEvent`]s.
///
/// Wraps a [`broadcast::Sender`] so any number of subscribers can
/// independently receive every published event.
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the store remains the source of truth either way.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
