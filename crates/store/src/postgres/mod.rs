//! PostgreSQL storage backends.
//!
//! All queries use the runtime `sqlx::query_as` API against the schema in
//! `migrations/`, so the crate compiles without a live database. Rows are
//! read into plain row structs and converted into domain records; a row
//! that fails conversion surfaces as a corrupt-record error rather than a
//! panic.

pub mod assets;
pub mod jobs;
pub mod ledger;

pub use assets::PgAssetStore;
pub use jobs::PgJobStore;
pub use ledger::PgTokenLedger;

/// True when the error is a PostgreSQL unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
