//! Adapter for the external generation service.
//!
//! The pipeline talks to the provider exclusively through the
//! [`GenerationProvider`] trait, so the HTTP client ([`http::HttpProvider`])
//! and the scripted in-process provider ([`fake::FakeProvider`]) are
//! interchangeable. Errors leave this crate already classified as
//! transient or permanent; callers never inspect HTTP status codes.

pub mod adapter;
pub mod fake;
pub mod http;

pub use adapter::{AssetPayload, GenerationProvider, PollOutcome, ProviderError, SubmitAck};
pub use fake::FakeProvider;
pub use http::{HttpProvider, ProviderConfig};
