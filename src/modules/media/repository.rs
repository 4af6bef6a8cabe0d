use super::model::{Episode, Upload};
use super::store::{EpisodeStore, UploadStore};
use crate::common::error::StoreError;
use crate::infrastructure::db::pool::DbPool;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone)]
pub struct EpisodeRepository {
    pool: DbPool,
}

impl EpisodeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EpisodeStore for EpisodeRepository {
    async fn get(&self, id: Uuid) -> Result<Episode, StoreError> {
        sqlx::query_as::<_, Episode>("SELECT id, title, filesystem_path FROM episodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("episode", id))
    }

    async fn set_filesystem_path(
        &self,
        id: Uuid,
        path: Option<&str>,
    ) -> Result<Episode, StoreError> {
        sqlx::query_as::<_, Episode>(
            r#"
            UPDATE episodes SET filesystem_path = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING id, title, filesystem_path
            "#,
        )
        .bind(path)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::not_found("episode", id))
    }
}

#[derive(Clone)]
pub struct UploadRepository {
    pool: DbPool,
}

impl UploadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadStore for UploadRepository {
    async fn get(&self, id: Uuid) -> Result<Upload, StoreError> {
        sqlx::query_as::<_, Upload>("SELECT id, stored_path, status FROM uploads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("upload", id))
    }
}
