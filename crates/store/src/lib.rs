//! Persistence for jobs, the token ledger, and generated assets.
//!
//! Everything upstream is written against the narrow traits in [`traits`].
//! Two backends ship: in-memory (tests, Postgres-less development) and
//! PostgreSQL over sqlx. Blob payloads live behind [`blob::BlobStore`] with
//! memory and local-filesystem backends.

use sqlx::postgres::PgPoolOptions;

pub mod blob;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod traits;

pub use error::{BlobError, LedgerError, StoreError};
pub use traits::{AssetStore, JobStore, TokenLedger};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Apply pending migrations from `migrations/`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Cheap liveness probe for the pool.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
