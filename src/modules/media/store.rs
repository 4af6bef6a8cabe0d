use super::model::{Episode, Upload};
use crate::common::error::StoreError;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait EpisodeStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Episode, StoreError>;

    /// Points the episode at a published master playlist, or clears it.
    async fn set_filesystem_path(
        &self,
        id: Uuid,
        path: Option<&str>,
    ) -> Result<Episode, StoreError>;
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Upload, StoreError>;
}
