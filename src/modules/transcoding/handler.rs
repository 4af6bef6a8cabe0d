use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::modules::transcoding::dto::*;
use crate::modules::transcoding::model::{JobStatistics, PresetInfo};
use crate::modules::transcoding::service::ServiceError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;
use validator::Validate;

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            other => {
                error!(error = %other, "Transcoding request failed");
                ApiError::internal(other.to_string())
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/transcoding/jobs",
    request_body = EnqueueJobRequest,
    responses(
        (status = 201, description = "Job Enqueued", body = ApiResponse<JobResponse>),
        (status = 400, description = "Upload not completed or episode already has an active job"),
        (status = 404, description = "Episode or Upload Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Transcoding"
)]
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(req): Json<EnqueueJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .transcoding
        .enqueue(
            req.created_by_id,
            req.episode_id,
            req.upload_id,
            req.preset_info.unwrap_or_else(PresetInfo::new),
        )
        .await?;
    Ok(ApiSuccess::created(
        JobResponse::from(job),
        "Transcoding job enqueued",
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/transcoding/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "List Jobs", body = ApiResponse<Vec<JobResponse>>),
        (status = 400, description = "Bad Request"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Transcoding"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    query
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let jobs = state
        .transcoding
        .list(&query.filter(), query.limit, query.offset)
        .await?;
    let jobs: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
    Ok(ApiSuccess::ok(jobs, "Transcoding jobs retrieved"))
}

#[utoipa::path(
    get,
    path = "/api/v1/transcoding/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Get Job", body = ApiResponse<JobResponse>),
        (status = 404, description = "Job Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Transcoding"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.transcoding.get(id).await?;
    Ok(ApiSuccess::ok(JobResponse::from(job), "Transcoding job retrieved"))
}

#[utoipa::path(
    get,
    path = "/api/v1/transcoding/jobs/{id}/logs",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job Logs", body = ApiResponse<JobLogsResponse>),
        (status = 404, description = "Job Not Found")
    ),
    tag = "Transcoding"
)]
pub async fn get_job_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = state.transcoding.logs(id).await?;
    Ok(ApiSuccess::ok(
        JobLogsResponse { job_id: id, logs },
        "Transcoding logs retrieved",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/transcoding/jobs/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job Cancelled", body = ApiResponse<JobResponse>),
        (status = 400, description = "Job already finished"),
        (status = 404, description = "Job Not Found")
    ),
    tag = "Transcoding"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.transcoding.cancel(id).await?;
    Ok(ApiSuccess::ok(JobResponse::from(job), "Transcoding job cancelled"))
}

#[utoipa::path(
    post,
    path = "/api/v1/transcoding/jobs/{id}/retry",
    params(
        ("id" = Uuid, Path, description = "Failed or cancelled job ID")
    ),
    request_body = RetryJobRequest,
    responses(
        (status = 201, description = "Retry Enqueued", body = ApiResponse<JobResponse>),
        (status = 400, description = "Job is not retryable"),
        (status = 404, description = "Job Not Found")
    ),
    tag = "Transcoding"
)]
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RetryJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .transcoding
        .retry(id, req.created_by_id, req.upload_id)
        .await?;
    Ok(ApiSuccess::created(
        JobResponse::from(job),
        "Transcoding job retried",
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/transcoding/stats",
    responses(
        (status = 200, description = "Job Statistics", body = ApiResponse<JobStatistics>),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Transcoding"
)]
pub async fn get_statistics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.transcoding.statistics().await?;
    Ok(ApiSuccess::ok(stats, "Transcoding statistics retrieved"))
}

#[utoipa::path(
    post,
    path = "/api/v1/transcoding/maintenance/cleanup-logs",
    request_body = CleanupLogsRequest,
    responses(
        (status = 200, description = "Logs Cleared", body = ApiResponse<CleanupLogsResponse>),
        (status = 400, description = "Bad Request")
    ),
    tag = "Transcoding"
)]
pub async fn cleanup_logs(
    State(state): State<AppState>,
    Json(req): Json<CleanupLogsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let cleared = state.transcoding.cleanup_old_logs(req.days_old).await?;
    Ok(ApiSuccess::ok(
        CleanupLogsResponse { cleared },
        "Old transcoding logs cleared",
    ))
}
