use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use sqlx::types::Json;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transcoding_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Legal edges of the job state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Success)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    /// Statuses from which `next` may be entered.
    pub fn sources_of(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Schema-less job metadata. Known keys get typed accessors; everything else
/// is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct PresetInfo(pub Map<String, Value>);

impl PresetInfo {
    pub const PREFER_DOWNSCALE_TO_1080: &'static str = "prefer_downscale_to_1080";
    pub const KEEP_ORIGINAL: &'static str = "keep_original";
    pub const UPLOAD_ID: &'static str = "uploadId";
    pub const RESOLUTIONS: &'static str = "resolutions";
    pub const OUTPUT_DIR: &'static str = "outputDir";
    pub const MASTER_PLAYLIST_PATH: &'static str = "masterPlaylistPath";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Overlay `other` onto `self`; keys in `other` win.
    pub fn merge(&mut self, other: PresetInfo) {
        self.0.extend(other.0);
    }

    pub fn prefer_downscale_to_1080(&self) -> bool {
        self.bool_or(Self::PREFER_DOWNSCALE_TO_1080, true)
    }

    pub fn keep_original(&self) -> bool {
        self.bool_or(Self::KEEP_ORIGINAL, false)
    }

    pub fn upload_id(&self) -> Option<Uuid> {
        self.get(Self::UPLOAD_ID)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn resolutions(&self) -> Vec<String> {
        self.get(Self::RESOLUTIONS)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TranscodingJob {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub upload_id: Uuid,
    pub status: JobStatus,
    pub created_by_id: Uuid,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<OffsetDateTime>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub finished_at: Option<OffsetDateTime>,
    #[schema(value_type = Object)]
    pub preset_info: Json<PresetInfo>,
    pub logs_text: Option<String>,
}

impl TranscodingJob {
    pub fn preset(&self) -> &PresetInfo {
        &self.preset_info.0
    }
}

/// Fields for a job row that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub episode_id: Uuid,
    pub upload_id: Uuid,
    pub created_by_id: Uuid,
    pub preset_info: PresetInfo,
}

/// Optional columns written together with a status change.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub started_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
    /// Merged into the stored preset info.
    pub preset_info: Option<PresetInfo>,
}

impl JobUpdate {
    pub fn started_now() -> Self {
        Self {
            started_at: Some(OffsetDateTime::now_utc()),
            ..Self::default()
        }
    }

    pub fn finished_now() -> Self {
        Self {
            finished_at: Some(OffsetDateTime::now_utc()),
            ..Self::default()
        }
    }

    pub fn with_preset(mut self, preset_info: PresetInfo) -> Self {
        self.preset_info = Some(preset_info);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub episode_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
}

impl JobFilter {
    pub fn matches(&self, job: &TranscodingJob) -> bool {
        self.status.is_none_or(|s| s == job.status)
            && self.episode_id.is_none_or(|id| id == job.episode_id)
            && self.created_by_id.is_none_or(|id| id == job.created_by_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub success: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Running => self.running += count,
            JobStatus::Success => self.success += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.running + self.success + self.failed + self.cancelled
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct JobStatistics {
    pub total_jobs: i64,
    pub status_counts: StatusCounts,
    pub average_duration_ms: f64,
    /// Percentage of finished jobs (success + failed) that succeeded.
    pub success_rate: f64,
}

impl JobStatistics {
    pub fn from_counts(status_counts: StatusCounts, average_duration_ms: f64) -> Self {
        let finished = status_counts.success + status_counts.failed;
        let success_rate = if finished > 0 {
            status_counts.success as f64 / finished as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_jobs: status_counts.total(),
            status_counts,
            average_duration_ms,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in JobStatus::ALL.into_iter().filter(JobStatus::is_terminal) {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn running_is_only_entered_from_pending() {
        assert_eq!(JobStatus::sources_of(JobStatus::Running), vec![JobStatus::Pending]);
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn preset_defaults_when_keys_missing() {
        let preset = PresetInfo::new();
        assert!(preset.prefer_downscale_to_1080());
        assert!(!preset.keep_original());
        assert!(preset.upload_id().is_none());
    }

    #[test]
    fn preset_keeps_unknown_keys_through_serde() {
        let raw = serde_json::json!({
            "keep_original": true,
            "videoTitle": "Pilot",
            "batch": { "id": 7 }
        });
        let preset: PresetInfo = serde_json::from_value(raw.clone()).unwrap();
        assert!(preset.keep_original());
        assert_eq!(serde_json::to_value(&preset).unwrap(), raw);
    }

    #[test]
    fn statistics_success_rate_ignores_unfinished_jobs() {
        let mut counts = StatusCounts::default();
        counts.add(JobStatus::Success, 3);
        counts.add(JobStatus::Failed, 1);
        counts.add(JobStatus::Pending, 10);
        let stats = JobStatistics::from_counts(counts, 1500.0);
        assert_eq!(stats.total_jobs, 14);
        assert!((stats.success_rate - 75.0).abs() < f64::EPSILON);
    }
}
