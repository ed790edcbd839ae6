//! In-memory [`AssetStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use atelier_core::types::{AssetId, JobId};

use crate::error::StoreError;
use crate::models::asset::{Asset, NewAsset};
use crate::traits::AssetStore;

/// Asset records in a mutex-guarded map.
#[derive(Default)]
pub struct MemoryAssetStore {
    assets: Mutex<HashMap<AssetId, Asset>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn insert(&self, new: NewAsset) -> Result<Asset, StoreError> {
        let mut assets = self.assets.lock().await;
        if assets.values().any(|asset| asset.job_id == new.job_id) {
            return Err(StoreError::DuplicateAsset(new.job_id));
        }
        let asset = Asset::from_new(new);
        assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn find(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.assets.lock().await.get(&id).cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Asset>, StoreError> {
        Ok(self
            .assets
            .lock()
            .await
            .values()
            .find(|asset| asset.job_id == job_id)
            .cloned())
    }
}
