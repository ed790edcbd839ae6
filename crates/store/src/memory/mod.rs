//! In-memory storage backends.
//!
//! Used by the test suites and by development runs without a DATABASE_URL.
//! Mutations serialize behind a single async mutex per store, which is the
//! whole concurrency story these tests rely on.

pub mod assets;
pub mod jobs;
pub mod ledger;

pub use assets::MemoryAssetStore;
pub use jobs::MemoryJobStore;
pub use ledger::MemoryTokenLedger;
