use super::model::{JobFilter, JobStatus, PresetInfo, TranscodingJob};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueJobRequest {
    pub episode_id: Uuid,
    pub upload_id: Uuid,
    pub created_by_id: Uuid,
    /// Encoding preferences such as `keep_original`; unknown keys are kept.
    #[serde(default)]
    pub preset_info: Option<PresetInfo>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryJobRequest {
    pub created_by_id: Uuid,
    /// Overrides the upload of the original job.
    #[serde(default)]
    pub upload_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub episode_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
    #[validate(range(min = 1, max = 500, message = "limit must be between 1 and 500"))]
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "offset must not be negative"))]
    pub offset: Option<i64>,
}

impl ListJobsQuery {
    pub fn filter(&self) -> JobFilter {
        JobFilter {
            status: self.status,
            episode_id: self.episode_id,
            created_by_id: self.created_by_id,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CleanupLogsRequest {
    #[validate(range(min = 0, message = "days_old must not be negative"))]
    pub days_old: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupLogsResponse {
    pub cleared: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobLogsResponse {
    pub job_id: Uuid,
    pub logs: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub upload_id: Uuid,
    pub status: JobStatus,
    pub created_by_id: Uuid,
    #[schema(value_type = String, format = DateTime)]
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[schema(value_type = Option<String>, format = DateTime)]
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub preset_info: PresetInfo,
    pub has_logs: bool,
}

impl From<TranscodingJob> for JobResponse {
    fn from(job: TranscodingJob) -> Self {
        Self {
            id: job.id,
            episode_id: job.episode_id,
            upload_id: job.upload_id,
            status: job.status,
            created_by_id: job.created_by_id,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            has_logs: job.logs_text.as_deref().is_some_and(|l| !l.is_empty()),
            preset_info: job.preset_info.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_rejects_out_of_range_paging() {
        let query: ListJobsQuery =
            serde_json::from_value(serde_json::json!({ "limit": 0, "offset": -3 })).unwrap();
        let errors = query.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("limit"));
        assert!(fields.contains_key("offset"));
    }

    #[test]
    fn job_response_hides_log_body() {
        let job = TranscodingJob {
            id: Uuid::nil(),
            episode_id: Uuid::nil(),
            upload_id: Uuid::nil(),
            status: JobStatus::Failed,
            created_by_id: Uuid::nil(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            started_at: None,
            finished_at: None,
            preset_info: sqlx::types::Json(PresetInfo::new()),
            logs_text: Some("FINAL ERROR [probe]: boom\n".to_string()),
        };
        let json = serde_json::to_value(JobResponse::from(job)).unwrap();
        assert_eq!(json["has_logs"], true);
        assert_eq!(json["status"], "failed");
        assert!(json.get("logs_text").is_none());
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
    }
}
