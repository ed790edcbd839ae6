//! Request handlers, grouped by resource.
//!
//! Handlers stay thin: deserialize, delegate to [`JobService`], wrap the
//! result in the `{ "data": ... }` envelope. Error mapping lives in
//! [`crate::error::AppError`]; logging lives in the service layer.
//!
//! [`JobService`]: atelier_pipeline::JobService

pub mod jobs;
pub mod ledger;
