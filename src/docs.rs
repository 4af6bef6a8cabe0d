use crate::modules::transcoding::dto::*;
use crate::modules::transcoding::model::{JobStatistics, JobStatus, PresetInfo, StatusCounts};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::transcoding::handler::enqueue_job,
        crate::modules::transcoding::handler::list_jobs,
        crate::modules::transcoding::handler::get_job,
        crate::modules::transcoding::handler::get_job_logs,
        crate::modules::transcoding::handler::cancel_job,
        crate::modules::transcoding::handler::retry_job,
        crate::modules::transcoding::handler::get_statistics,
        crate::modules::transcoding::handler::cleanup_logs,
    ),
    components(
        schemas(
            EnqueueJobRequest, RetryJobRequest, CleanupLogsRequest,
            JobResponse, JobLogsResponse, CleanupLogsResponse,
            JobStatus, PresetInfo, JobStatistics, StatusCounts,
        )
    ),
    tags(
        (name = "Transcoding", description = "HLS transcoding job administration")
    )
)]
pub struct ApiDoc;
