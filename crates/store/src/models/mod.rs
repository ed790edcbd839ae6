//! Persistent records shared by every storage backend.

pub mod asset;
pub mod job;
pub mod ledger;
