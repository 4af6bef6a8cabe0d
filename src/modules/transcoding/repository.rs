use super::model::{
    JobFilter, JobStatistics, JobStatus, JobUpdate, NewJob, StatusCounts, TranscodingJob,
};
use super::store::JobStore;
use crate::common::error::StoreError;
use crate::infrastructure::db::pool::DbPool;
use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create(&self, job: NewJob) -> Result<TranscodingJob, StoreError> {
        let job = sqlx::query_as::<_, TranscodingJob>(
            r#"
            INSERT INTO transcoding_jobs (id, episode_id, upload_id, status, created_by_id, preset_info)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job.episode_id)
        .bind(job.upload_id)
        .bind(job.created_by_id)
        .bind(Json(job.preset_info))
        .fetch_one(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<TranscodingJob, StoreError> {
        sqlx::query_as::<_, TranscodingJob>("SELECT * FROM transcoding_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("transcoding job", id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        fields: JobUpdate,
    ) -> Result<TranscodingJob, StoreError> {
        let allowed_from: Vec<String> = JobStatus::sources_of(status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // The status guard and the write happen in one statement so a
        // concurrent cancel cannot be overwritten.
        let updated = sqlx::query_as::<_, TranscodingJob>(
            r#"
            UPDATE transcoding_jobs
            SET
                status = $2,
                started_at = COALESCE($3, started_at),
                finished_at = COALESCE($4, finished_at),
                preset_info = CASE WHEN $5::jsonb IS NULL THEN preset_info ELSE preset_info || $5::jsonb END
            WHERE id = $1 AND status::text = ANY($6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(fields.started_at)
        .bind(fields.finished_at)
        .bind(fields.preset_info.map(Json))
        .bind(&allowed_from)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(job) => Ok(job),
            None => {
                let current = self.get(id).await?;
                Err(StoreError::InvalidTransition {
                    id,
                    from: current.status,
                    to: status,
                })
            }
        }
    }

    async fn find_active_by_episode(
        &self,
        episode_id: Uuid,
    ) -> Result<Option<TranscodingJob>, StoreError> {
        let job = sqlx::query_as::<_, TranscodingJob>(
            r#"
            SELECT * FROM transcoding_jobs
            WHERE episode_id = $1 AND status IN ('pending', 'running')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(episode_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transcoding_jobs SET logs_text = COALESCE(logs_text, '') || $2 || E'\\n' WHERE id = $1",
        )
        .bind(id)
        .bind(line)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("transcoding job", id));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TranscodingJob>, StoreError> {
        let jobs = sqlx::query_as::<_, TranscodingJob>(
            r#"
            SELECT * FROM transcoding_jobs
            WHERE ($1::transcoding_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR episode_id = $2)
              AND ($3::uuid IS NULL OR created_by_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status)
        .bind(filter.episode_id)
        .bind(filter.created_by_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn statistics(&self) -> Result<JobStatistics, StoreError> {
        let rows = sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM transcoding_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.add(status, count);
        }

        let average_duration_ms = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT (AVG(EXTRACT(EPOCH FROM (finished_at - started_at))) * 1000)::float8
            FROM transcoding_jobs
            WHERE status IN ('success', 'failed')
              AND started_at IS NOT NULL
              AND finished_at IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .unwrap_or(0.0);

        Ok(JobStatistics::from_counts(counts, average_duration_ms))
    }

    async fn clear_logs_older_than(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE transcoding_jobs SET logs_text = NULL WHERE created_at < $1 AND logs_text IS NOT NULL",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
