use super::model::{
    JobFilter, JobStatistics, JobStatus, JobUpdate, NewJob, TranscodingJob,
};
use crate::common::error::StoreError;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Durable record of transcoding jobs.
///
/// Field writes are last-writer-wins. Status writes are checked against
/// [`JobStatus::can_transition_to`]; an illegal move returns
/// [`StoreError::InvalidTransition`] and leaves the row untouched.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: NewJob) -> Result<TranscodingJob, StoreError>;

    async fn get(&self, id: Uuid) -> Result<TranscodingJob, StoreError>;

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        fields: JobUpdate,
    ) -> Result<TranscodingJob, StoreError>;

    async fn find_active_by_episode(
        &self,
        episode_id: Uuid,
    ) -> Result<Option<TranscodingJob>, StoreError>;

    /// Appends one line to `logs_text` without touching anything else.
    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), StoreError>;

    /// Newest first.
    async fn list(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TranscodingJob>, StoreError>;

    async fn statistics(&self) -> Result<JobStatistics, StoreError>;

    /// Clears `logs_text` on jobs created before `cutoff`; returns how many.
    async fn clear_logs_older_than(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;
}
