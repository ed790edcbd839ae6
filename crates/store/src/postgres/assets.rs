//! PostgreSQL [`AssetStore`].

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::types::{AssetId, JobId, Timestamp};

use crate::error::StoreError;
use crate::models::asset::{Asset, NewAsset};
use crate::postgres::is_unique_violation;
use crate::traits::AssetStore;

/// Column list for `assets` queries.
const COLUMNS: &str = "id, job_id, owner_id, url, content_type, size_bytes, \
    checksum_sha256, created_at";

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    job_id: Uuid,
    owner_id: i64,
    url: String,
    content_type: String,
    size_bytes: i64,
    checksum_sha256: String,
    created_at: Timestamp,
}

impl AssetRow {
    fn into_asset(self) -> Asset {
        Asset {
            id: self.id,
            job_id: self.job_id,
            owner_id: self.owner_id,
            url: self.url,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            checksum_sha256: self.checksum_sha256,
            created_at: self.created_at,
        }
    }
}

/// Asset records in the `assets` table.
pub struct PgAssetStore {
    pool: PgPool,
}

impl PgAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn insert(&self, new: NewAsset) -> Result<Asset, StoreError> {
        let asset = Asset::from_new(new);
        let query = format!(
            "INSERT INTO assets \
                 (id, job_id, owner_id, url, content_type, size_bytes, \
                  checksum_sha256, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AssetRow>(&query)
            .bind(asset.id)
            .bind(asset.job_id)
            .bind(asset.owner_id)
            .bind(&asset.url)
            .bind(&asset.content_type)
            .bind(asset.size_bytes)
            .bind(&asset.checksum_sha256)
            .bind(asset.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateAsset(asset.job_id)
                } else {
                    e.into()
                }
            })?;
        Ok(row.into_asset())
    }

    async fn find(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1");
        let row = sqlx::query_as::<_, AssetRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AssetRow::into_asset))
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Asset>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE job_id = $1");
        let row = sqlx::query_as::<_, AssetRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AssetRow::into_asset))
    }
}
