use super::events::JobRef;
use super::model::{
    JobFilter, JobStatistics, JobStatus, JobUpdate, NewJob, PresetInfo, TranscodingJob,
};
use super::store::JobStore;
use crate::common::error::StoreError;
use crate::infrastructure::queue::{QueueError, WorkQueue};
use crate::modules::media::store::{EpisodeStore, UploadStore};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("could not enqueue job")]
    Queue(#[from] QueueError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            other => ServiceError::Store(other),
        }
    }
}

/// Operator-facing job management: enqueue, inspect, cancel, retry.
#[derive(Clone)]
pub struct TranscodingService {
    jobs: Arc<dyn JobStore>,
    episodes: Arc<dyn EpisodeStore>,
    uploads: Arc<dyn UploadStore>,
    queue: Arc<dyn WorkQueue>,
}

impl TranscodingService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        episodes: Arc<dyn EpisodeStore>,
        uploads: Arc<dyn UploadStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            jobs,
            episodes,
            uploads,
            queue,
        }
    }

    /// Creates a `pending` job and only then pushes its reference.
    pub async fn enqueue(
        &self,
        created_by_id: Uuid,
        episode_id: Uuid,
        upload_id: Uuid,
        preset_info: PresetInfo,
    ) -> Result<TranscodingJob, ServiceError> {
        let episode = self.episodes.get(episode_id).await?;

        let upload = self.uploads.get(upload_id).await?;
        if !upload.is_completed() {
            return Err(ServiceError::BadRequest(
                "Upload must be completed before transcoding".to_string(),
            ));
        }

        if let Some(active) = self.jobs.find_active_by_episode(episode_id).await? {
            return Err(ServiceError::BadRequest(format!(
                "Episode already has a pending/running transcoding job: {}",
                active.id
            )));
        }

        let mut preset = preset_info;
        preset.insert(PresetInfo::UPLOAD_ID, upload_id.to_string());
        if let Some(title) = episode.title {
            preset.insert("videoTitle", title);
        }
        if let Ok(now) = OffsetDateTime::now_utc().format(&Rfc3339) {
            preset.insert("createdAt", now);
        }

        let job = self
            .jobs
            .create(NewJob {
                episode_id,
                upload_id,
                created_by_id,
                preset_info: preset,
            })
            .await?;

        if let Err(e) = self.queue.push(&JobRef::from(&job)).await {
            error!(job_id = %job.id, error = %e, "Queue push failed, cancelling job");
            // nothing will ever pop this row
            let _ = self
                .jobs
                .append_log(job.id, &format!("Queue push failed: {e}"))
                .await;
            let _ = self
                .jobs
                .update_status(job.id, JobStatus::Cancelled, JobUpdate::finished_now())
                .await;
            return Err(e.into());
        }

        info!(job_id = %job.id, %episode_id, %upload_id, "Enqueued transcoding job");
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<TranscodingJob, ServiceError> {
        Ok(self.jobs.get(id).await?)
    }

    pub async fn list(
        &self,
        filter: &JobFilter,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<TranscodingJob>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        if limit <= 0 || offset < 0 {
            return Err(ServiceError::BadRequest(
                "limit must be positive and offset non-negative".to_string(),
            ));
        }
        Ok(self.jobs.list(filter, limit, offset).await?)
    }

    pub async fn logs(&self, id: Uuid) -> Result<String, ServiceError> {
        let job = self.jobs.get(id).await?;
        Ok(match job.logs_text {
            Some(text) if !text.is_empty() => text,
            _ => format!("No logs available for job {id}"),
        })
    }

    /// Cancels a `pending` or `running` job. A running worker notices before
    /// its next rendition.
    pub async fn cancel(&self, id: Uuid) -> Result<TranscodingJob, ServiceError> {
        let job = self.jobs.get(id).await?;
        if job.status.is_terminal() {
            return Err(ServiceError::BadRequest(format!(
                "Cannot cancel job with status: {}",
                job.status
            )));
        }

        match self
            .jobs
            .update_status(id, JobStatus::Cancelled, JobUpdate::finished_now())
            .await
        {
            Ok(cancelled) => {
                info!(job_id = %id, previous = %job.status, "Cancelled transcoding job");
                Ok(cancelled)
            }
            Err(StoreError::InvalidTransition { from, .. }) => Err(ServiceError::BadRequest(
                format!("Cannot cancel job with status: {from}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Enqueues a fresh job for the same episode. The original job is left
    /// untouched.
    pub async fn retry(
        &self,
        id: Uuid,
        created_by_id: Uuid,
        upload_id: Option<Uuid>,
    ) -> Result<TranscodingJob, ServiceError> {
        let original = self.jobs.get(id).await?;
        if !matches!(original.status, JobStatus::Failed | JobStatus::Cancelled) {
            return Err(ServiceError::BadRequest(format!(
                "Can only retry failed or cancelled jobs, current status: {}",
                original.status
            )));
        }

        let preset = original.preset();
        let upload_id = upload_id
            .or_else(|| preset.upload_id())
            .unwrap_or(original.upload_id);

        let carried = [PresetInfo::PREFER_DOWNSCALE_TO_1080, PresetInfo::KEEP_ORIGINAL]
            .into_iter()
            .filter_map(|key| preset.get(key).map(|v| (key, v.clone())))
            .fold(PresetInfo::new(), |acc, (key, value)| acc.with(key, value))
            .with("retryOf", original.id.to_string());

        let job = self
            .enqueue(created_by_id, original.episode_id, upload_id, carried)
            .await?;
        info!(original_job_id = %id, new_job_id = %job.id, "Retried transcoding job");
        Ok(job)
    }

    pub async fn statistics(&self) -> Result<JobStatistics, ServiceError> {
        Ok(self.jobs.statistics().await?)
    }

    /// Clears logs on jobs created more than `days_old` days ago.
    pub async fn cleanup_old_logs(&self, days_old: Option<i64>) -> Result<u64, ServiceError> {
        let days_old = days_old.unwrap_or(DEFAULT_LOG_RETENTION_DAYS);
        if days_old < 0 {
            return Err(ServiceError::BadRequest(
                "days_old must not be negative".to_string(),
            ));
        }
        let cutoff = OffsetDateTime::now_utc() - Duration::days(days_old);
        let cleared = self.jobs.clear_logs_older_than(cutoff).await?;
        info!(cleared, days_old, "Cleared old transcoding logs");
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queue::InMemoryWorkQueue;
    use crate::modules::media::memory::{InMemoryEpisodeStore, InMemoryUploadStore};
    use crate::modules::media::model::{Episode, Upload};
    use crate::modules::transcoding::memory::InMemoryJobStore;
    use std::time::Duration as StdDuration;

    struct Fixture {
        service: TranscodingService,
        jobs: Arc<InMemoryJobStore>,
        queue: InMemoryWorkQueue,
        episode_id: Uuid,
        upload_id: Uuid,
        admin: Uuid,
    }

    async fn fixture(upload_status: &str) -> Fixture {
        let jobs = Arc::new(InMemoryJobStore::new());
        let episodes = Arc::new(InMemoryEpisodeStore::new());
        let uploads = Arc::new(InMemoryUploadStore::new());
        let queue = InMemoryWorkQueue::new();

        let episode_id = Uuid::new_v4();
        let upload_id = Uuid::new_v4();
        episodes
            .insert(Episode {
                id: episode_id,
                title: Some("Pilot".to_string()),
                filesystem_path: None,
            })
            .await;
        uploads
            .insert(Upload {
                id: upload_id,
                stored_path: "raw/pilot.mkv".to_string(),
                status: upload_status.to_string(),
            })
            .await;

        let service = TranscodingService::new(
            jobs.clone(),
            episodes,
            uploads,
            Arc::new(queue.clone()),
        );
        Fixture {
            service,
            jobs,
            queue,
            episode_id,
            upload_id,
            admin: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn enqueue_creates_pending_job_then_pushes_ref() {
        let f = fixture("completed").await;

        let job = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.preset().upload_id(), Some(f.upload_id));
        assert_eq!(
            job.preset().get("videoTitle").and_then(|v| v.as_str()),
            Some("Pilot")
        );
        let pushed = f.queue.pop(StdDuration::from_millis(10)).await.unwrap();
        assert_eq!(pushed, Some(JobRef::from(&job)));
    }

    #[tokio::test]
    async fn enqueue_rejects_incomplete_upload() {
        let f = fixture("uploading").await;
        let err = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn enqueue_rejects_second_active_job_for_episode() {
        let f = fixture("completed").await;
        f.service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap();

        let err = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already has a pending/running"));
    }

    #[tokio::test]
    async fn enqueue_unknown_episode_is_not_found() {
        let f = fixture("completed").await;
        let err = f
            .service
            .enqueue(f.admin, Uuid::new_v4(), f.upload_id, PresetInfo::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_terminal_job_is_rejected() {
        let f = fixture("completed").await;
        let job = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap();

        let cancelled = f.service.cancel(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.finished_at.is_some());

        let err = f.service.cancel(job.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel job with status: cancelled");
    }

    #[tokio::test]
    async fn retry_creates_new_job_and_leaves_original() {
        let f = fixture("completed").await;
        let preset = PresetInfo::new().with(PresetInfo::KEEP_ORIGINAL, true);
        let first = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, preset)
            .await
            .unwrap();
        f.jobs
            .update_status(first.id, JobStatus::Running, JobUpdate::started_now())
            .await
            .unwrap();
        f.jobs
            .update_status(first.id, JobStatus::Failed, JobUpdate::finished_now())
            .await
            .unwrap();
        let before = f.jobs.get(first.id).await.unwrap();

        let second = f.service.retry(first.id, f.admin, None).await.unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(second.status, JobStatus::Pending);
        assert_eq!(second.episode_id, first.episode_id);
        assert_eq!(second.upload_id, f.upload_id);
        assert!(second.preset().keep_original());

        let after = f.jobs.get(first.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.finished_at, before.finished_at);
    }

    #[tokio::test]
    async fn retry_of_pending_job_is_rejected() {
        let f = fixture("completed").await;
        let job = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap();
        let err = f.service.retry(job.id, f.admin, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn logs_fall_back_to_placeholder() {
        let f = fixture("completed").await;
        let job = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap();
        assert_eq!(
            f.service.logs(job.id).await.unwrap(),
            format!("No logs available for job {}", job.id)
        );

        f.jobs.append_log(job.id, "Job started").await.unwrap();
        assert_eq!(f.service.logs(job.id).await.unwrap(), "Job started\n");
    }

    #[tokio::test]
    async fn list_rejects_negative_paging() {
        let f = fixture("completed").await;
        let err = f
            .service
            .list(&JobFilter::default(), Some(10), Some(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn cleanup_clears_logs_of_old_jobs() {
        let f = fixture("completed").await;
        let job = f
            .service
            .enqueue(f.admin, f.episode_id, f.upload_id, PresetInfo::new())
            .await
            .unwrap();
        f.jobs.append_log(job.id, "line").await.unwrap();

        assert_eq!(f.service.cleanup_old_logs(Some(30)).await.unwrap(), 0);
        assert_eq!(f.service.cleanup_old_logs(Some(0)).await.unwrap(), 1);
        assert!(f.jobs.get(job.id).await.unwrap().logs_text.is_none());
    }
}
