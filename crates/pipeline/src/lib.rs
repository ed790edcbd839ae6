//! Orchestration for the generation pipeline.
//!
//! A submitted job moves through three hands: a dispatch worker takes it
//! from the queue and hands it to the provider, the poller watches the
//! provider until it answers, and the finalizer lands the finished asset.
//! Between hands the job lives entirely in the store; every component can
//! crash and restart without losing it. Token settlement is the other
//! thread running through this crate: reserved at submission, consumed on
//! completion, refunded exactly once on any failure.

pub mod compensation;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod finalizer;
pub mod poller;
pub mod queue;
pub mod runtime;
pub mod service;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use events::{JobEvent, JobEventBus};
pub use runtime::PipelineRuntime;
pub use service::{JobService, JobStatusView, ServiceError};
