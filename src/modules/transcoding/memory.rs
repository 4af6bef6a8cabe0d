use super::model::{
    JobFilter, JobStatistics, JobStatus, JobUpdate, NewJob, StatusCounts, TranscodingJob,
};
use super::store::JobStore;
use crate::common::error::StoreError;
use async_trait::async_trait;
use sqlx::types::Json;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local [`JobStore`] used by tests and single-node setups.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, TranscodingJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<TranscodingJob, StoreError> {
        let job = TranscodingJob {
            id: Uuid::new_v4(),
            episode_id: job.episode_id,
            upload_id: job.upload_id,
            status: JobStatus::Pending,
            created_by_id: job.created_by_id,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            finished_at: None,
            preset_info: Json(job.preset_info),
            logs_text: None,
        };
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<TranscodingJob, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("transcoding job", id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        fields: JobUpdate,
    ) -> Result<TranscodingJob, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or(StoreError::not_found("transcoding job", id))?;

        if !job.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to: status,
            });
        }

        job.status = status;
        if let Some(started_at) = fields.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(finished_at) = fields.finished_at {
            job.finished_at = Some(finished_at);
        }
        if let Some(preset) = fields.preset_info {
            job.preset_info.0.merge(preset);
        }
        Ok(job.clone())
    }

    async fn find_active_by_episode(
        &self,
        episode_id: Uuid,
    ) -> Result<Option<TranscodingJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.episode_id == episode_id && job.status.is_active())
            .max_by_key(|job| job.created_at)
            .cloned())
    }

    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or(StoreError::not_found("transcoding job", id))?;
        let logs = job.logs_text.get_or_insert_with(String::new);
        logs.push_str(line);
        logs.push('\n');
        Ok(())
    }

    async fn list(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TranscodingJob>, StoreError> {
        let mut jobs: Vec<TranscodingJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn statistics(&self) -> Result<JobStatistics, StoreError> {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts::default();
        let mut durations = Vec::new();

        for job in jobs.values() {
            counts.add(job.status, 1);
            if matches!(job.status, JobStatus::Success | JobStatus::Failed) {
                if let (Some(started), Some(finished)) = (job.started_at, job.finished_at) {
                    durations.push((finished - started).as_seconds_f64() * 1000.0);
                }
            }
        }

        let average = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        Ok(JobStatistics::from_counts(counts, average))
    }

    async fn clear_logs_older_than(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut cleared = 0;
        for job in self.jobs.write().await.values_mut() {
            if job.created_at < cutoff && job.logs_text.is_some() {
                job.logs_text = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
