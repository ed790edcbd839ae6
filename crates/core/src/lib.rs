//! Domain logic for the atelier generation pipeline.
//!
//! This crate has zero internal dependencies so the store, pipeline, and API
//! layers can all build on it. Everything here is pure: request parameter
//! validation, the job status machine, the token cost schedule, and the
//! poll-backoff arithmetic.

pub mod backoff;
pub mod cost;
pub mod error;
pub mod hashing;
pub mod params;
pub mod status;
pub mod types;

pub use error::CoreError;
