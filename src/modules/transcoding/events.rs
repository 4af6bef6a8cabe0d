use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue payload handed from the producer to a worker. The job row is the
/// source of truth; this only says which row to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub job_id: Uuid,
    pub episode_id: Uuid,
    pub upload_id: Uuid,
}

impl JobRef {
    pub fn new(job_id: Uuid, episode_id: Uuid, upload_id: Uuid) -> Self {
        Self {
            job_id,
            episode_id,
            upload_id,
        }
    }
}

impl From<&super::model::TranscodingJob> for JobRef {
    fn from(job: &super::model::TranscodingJob) -> Self {
        Self::new(job.id, job.episode_id, job.upload_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let job_ref = JobRef::new(Uuid::nil(), Uuid::nil(), Uuid::nil());
        let json = serde_json::to_value(job_ref).unwrap();
        assert!(json.get("jobId").is_some());
        assert!(json.get("episodeId").is_some());
        assert!(json.get("uploadId").is_some());
    }
}
