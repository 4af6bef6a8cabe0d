use crate::common::error::StoreError;
use crate::config::settings::TranscoderConfig;
use crate::infrastructure::queue::{QueueError, WorkQueue};
use crate::modules::media::store::{EpisodeStore, UploadStore};
use crate::modules::transcoding::events::JobRef;
use crate::modules::transcoding::model::{JobStatus, JobUpdate, TranscodingJob};
use crate::modules::transcoding::store::JobStore;
use crate::pipeline::encoder::{EncodeJob, Encoder};
use crate::pipeline::finalizer::{self, FinalizeError, FinalizeOutcome, FinalizeRequest, Finalizer};
use crate::pipeline::planner::{self, EncodingPreferences};
use crate::pipeline::playlist;
use crate::pipeline::probe::Prober;
use crate::pipeline::{SourceError, TranscodeError};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Collaborators the worker is built from.
#[derive(Clone)]
pub struct WorkerDeps {
    pub jobs: Arc<dyn JobStore>,
    pub episodes: Arc<dyn EpisodeStore>,
    pub uploads: Arc<dyn UploadStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub prober: Arc<dyn Prober>,
    pub encoder: Arc<dyn Encoder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    StoreUnavailable,
    AlreadyRunning,
    Terminal(JobStatus),
}

/// What happened to one dequeued reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Skipped(SkipReason),
    Succeeded,
    Failed,
    Cancelled,
}

pub struct TranscodeWorker {
    deps: WorkerDeps,
    finalizer: Finalizer,
    config: TranscoderConfig,
}

impl TranscodeWorker {
    pub fn new(deps: WorkerDeps, config: TranscoderConfig) -> Self {
        let finalizer = Finalizer::new(
            deps.jobs.clone(),
            deps.episodes.clone(),
            config.storage_root.clone(),
        );
        Self {
            deps,
            finalizer,
            config,
        }
    }

    /// Polls until `shutdown` fires. A job already picked up is always
    /// carried to a terminal state before this returns.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            queue = %self.config.queue_key,
            storage_root = %self.config.storage_root.display(),
            work_root = %self.config.work_root.display(),
            "🎥 Transcoder worker started"
        );

        loop {
            // Only the pop races shutdown; a dequeued job always runs to the end.
            let popped = tokio::select! {
                _ = shutdown.cancelled() => break,
                popped = self.deps.queue.pop(self.config.queue_pop_timeout) => popped,
            };

            match popped {
                Ok(Some(job_ref)) => {
                    self.handle(job_ref).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "Worker loop error"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_backoff) => {}
            }
        }

        info!("Shutting down transcoder worker");
    }

    /// Waits for one queue entry and processes it. `Ok(None)` means the pop
    /// timed out.
    pub async fn poll_once(&self) -> Result<Option<JobOutcome>, QueueError> {
        let popped = self.deps.queue.pop(self.config.queue_pop_timeout).await?;
        match popped {
            Some(job_ref) => Ok(Some(self.handle(job_ref).await)),
            None => Ok(None),
        }
    }

    async fn handle(&self, job_ref: JobRef) -> JobOutcome {
        info!(
            job_id = %job_ref.job_id,
            episode_id = %job_ref.episode_id,
            upload_id = %job_ref.upload_id,
            "📦 Dequeued job"
        );
        self.process(job_ref).await
    }

    pub async fn process(&self, job_ref: JobRef) -> JobOutcome {
        let job = match self.deps.jobs.get(job_ref.job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                warn!(job_id = %job_ref.job_id, "Skipping job that no longer exists");
                return JobOutcome::Skipped(SkipReason::Missing);
            }
            Err(e) => {
                error!(job_id = %job_ref.job_id, error = %e, "Could not load job");
                return JobOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };

        match job.status {
            JobStatus::Pending => {}
            JobStatus::Running => {
                debug!(job_id = %job.id, "Job already claimed by another worker");
                return JobOutcome::Skipped(SkipReason::AlreadyRunning);
            }
            status => {
                debug!(job_id = %job.id, %status, "Skipping finished job");
                return JobOutcome::Skipped(SkipReason::Terminal(status));
            }
        }

        let job = match self
            .deps
            .jobs
            .update_status(job.id, JobStatus::Running, JobUpdate::started_now())
            .await
        {
            Ok(job) => job,
            Err(StoreError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job.id, %from, "Lost the claim race");
                return if from == JobStatus::Running {
                    JobOutcome::Skipped(SkipReason::AlreadyRunning)
                } else {
                    JobOutcome::Skipped(SkipReason::Terminal(from))
                };
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Could not claim job");
                return JobOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };

        info!(job_id = %job.id, episode_id = %job.episode_id, "Processing transcoding job");
        let log = JobLog::new(self.deps.jobs.clone(), job.id);
        let work_dir = self.config.work_dir(job.id);

        match self.run_pipeline(&job, &work_dir, &log).await {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    log.append(&format!("WARNING: {warning}")).await;
                }
                info!(
                    job_id = %job.id,
                    episode_id = %job.episode_id,
                    output = %outcome.output_dir.display(),
                    "✅ Job completed successfully"
                );
                JobOutcome::Succeeded
            }
            Err(TranscodeError::Cancelled) => {
                info!(job_id = %job.id, "Job cancelled by operator, stopping");
                log.append("Cancelled by operator, stopping").await;
                self.discard_work_dir(&work_dir).await;
                JobOutcome::Cancelled
            }
            Err(e) => {
                self.fail(&job, &work_dir, &log, e).await;
                JobOutcome::Failed
            }
        }
    }

    async fn fail(&self, job: &TranscodingJob, work_dir: &Path, log: &JobLog, err: TranscodeError) {
        let report = err.report();
        error!(
            job_id = %job.id,
            episode_id = %job.episode_id,
            stage = err.stage(),
            error = %err,
            "❌ Job failed"
        );
        log.append(&report).await;
        self.discard_work_dir(work_dir).await;

        let result = self
            .deps
            .jobs
            .update_status(job.id, JobStatus::Failed, JobUpdate::finished_now())
            .await;
        match result {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                warn!(job_id = %job.id, %from, "Job left running state before it could be marked failed");
            }
            Err(e) => error!(job_id = %job.id, error = %e, "Could not mark job failed"),
        }
    }

    async fn run_pipeline(
        &self,
        job: &TranscodingJob,
        work_dir: &Path,
        log: &JobLog,
    ) -> Result<FinalizeOutcome, TranscodeError> {
        let started = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        log.append(&format!("Job started at {started}")).await;

        let upload = self.deps.uploads.get(job.upload_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => {
                TranscodeError::Source(SourceError::UploadMissing(job.upload_id))
            }
            other => TranscodeError::Store(other),
        })?;
        if !upload.is_completed() {
            return Err(SourceError::UploadNotCompleted {
                id: upload.id,
                status: upload.status,
            }
            .into());
        }
        self.deps.episodes.get(job.episode_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => {
                TranscodeError::Source(SourceError::EpisodeMissing(job.episode_id))
            }
            other => TranscodeError::Store(other),
        })?;

        let input = self.config.uploads_root.join(&upload.stored_path);
        let info = self.deps.prober.probe(&input).await?;
        log.append(&format!(
            "Video info: {}x{}, {:.2}s",
            info.width, info.height, info.duration_seconds
        ))
        .await;

        let preset = job.preset();
        let preferences = EncodingPreferences {
            prefer_downscale_to_1080: preset.prefer_downscale_to_1080(),
            keep_original: preset.keep_original(),
        };
        let renditions = planner::plan(&info, &preferences)?;
        let names: Vec<&str> = renditions.iter().map(|r| r.name.as_str()).collect();
        log.append(&format!("Transcoding to resolutions: {}", names.join(", ")))
            .await;

        for rendition in &renditions {
            self.ensure_not_cancelled(job.id).await?;

            log.append(&format!("[{}] encoding", rendition.name)).await;
            let encoded = self
                .deps
                .encoder
                .encode(EncodeJob {
                    input: &input,
                    rendition,
                    output_dir: &work_dir.join(&rendition.name),
                    source_duration_seconds: info.duration_seconds,
                })
                .await?;
            log.append(&format!(
                "[{}] done in {:.1}s",
                rendition.name,
                encoded.elapsed.as_secs_f64()
            ))
            .await;
        }

        let master = playlist::write_master(work_dir, &renditions)
            .await
            .map_err(TranscodeError::Playlist)?;
        log.append(&format!("Generated master playlist: {}", master.display()))
            .await;

        self.ensure_not_cancelled(job.id).await?;

        let outcome = self
            .finalizer
            .finalize(FinalizeRequest {
                job_id: job.id,
                episode_id: job.episode_id,
                work_dir,
                source_path: &input,
                renditions: &renditions,
                keep_original: preferences.keep_original,
            })
            .await
            .map_err(|e| match e {
                FinalizeError::Job(StoreError::InvalidTransition {
                    from: JobStatus::Cancelled,
                    ..
                }) => TranscodeError::Cancelled,
                other => TranscodeError::Finalize(other),
            })?;
        log.append(&format!(
            "Published to {}",
            outcome.master_playlist.display()
        ))
        .await;
        Ok(outcome)
    }

    async fn ensure_not_cancelled(&self, job_id: Uuid) -> Result<(), TranscodeError> {
        let current = self.deps.jobs.get(job_id).await?;
        if current.status == JobStatus::Cancelled {
            return Err(TranscodeError::Cancelled);
        }
        Ok(())
    }

    async fn discard_work_dir(&self, work_dir: &Path) {
        if let Err(e) = finalizer::remove_dir_if_present(work_dir).await {
            warn!(path = %work_dir.display(), error = %e, "Could not remove work directory");
        }
    }
}

/// Appends progress lines to a job's `logs_text` as they happen, so a crash
/// mid-job still leaves a trail. Write failures are only traced.
struct JobLog {
    jobs: Arc<dyn JobStore>,
    job_id: Uuid,
}

impl JobLog {
    fn new(jobs: Arc<dyn JobStore>, job_id: Uuid) -> Self {
        Self { jobs, job_id }
    }

    async fn append(&self, line: &str) {
        if let Err(e) = self.jobs.append_log(self.job_id, line).await {
            warn!(job_id = %self.job_id, error = %e, "Could not append to job log");
        }
    }
}
