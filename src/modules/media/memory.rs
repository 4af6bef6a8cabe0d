use super::model::{Episode, Upload};
use super::store::{EpisodeStore, UploadStore};
use crate::common::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryEpisodeStore {
    episodes: RwLock<HashMap<Uuid, Episode>>,
}

impl InMemoryEpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, episode: Episode) {
        self.episodes.write().await.insert(episode.id, episode);
    }
}

#[async_trait]
impl EpisodeStore for InMemoryEpisodeStore {
    async fn get(&self, id: Uuid) -> Result<Episode, StoreError> {
        self.episodes
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("episode", id))
    }

    async fn set_filesystem_path(
        &self,
        id: Uuid,
        path: Option<&str>,
    ) -> Result<Episode, StoreError> {
        let mut episodes = self.episodes.write().await;
        let episode = episodes
            .get_mut(&id)
            .ok_or(StoreError::not_found("episode", id))?;
        episode.filesystem_path = path.map(str::to_string);
        Ok(episode.clone())
    }
}

#[derive(Default)]
pub struct InMemoryUploadStore {
    uploads: RwLock<HashMap<Uuid, Upload>>,
}

impl InMemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, upload: Upload) {
        self.uploads.write().await.insert(upload.id, upload);
    }
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn get(&self, id: Uuid) -> Result<Upload, StoreError> {
        self.uploads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("upload", id))
    }
}
