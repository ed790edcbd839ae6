//! Generated asset records.
//!
//! Assets are append-only: created exactly once per completed job, never
//! updated afterwards.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use atelier_core::types::{AssetId, JobId, OwnerId, Timestamp};

/// A persisted generation result.
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub id: AssetId,
    pub job_id: JobId,
    pub owner_id: OwnerId,
    /// Blob storage reference (backend-specific URL).
    pub url: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub created_at: Timestamp,
}

impl Asset {
    /// Build an asset record from a persisted payload.
    pub fn from_new(new: NewAsset) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: new.job_id,
            owner_id: new.owner_id,
            url: new.url,
            content_type: new.content_type,
            size_bytes: new.size_bytes,
            checksum_sha256: new.checksum_sha256,
            created_at: Utc::now(),
        }
    }
}

/// Input for recording an asset. The id and timestamp are assigned by the
/// store.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub url: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
}
