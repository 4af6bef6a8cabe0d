use crate::config::env::{self, EnvKey};
use crate::pipeline::encoder::FfmpegSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub worker_enabled: bool,
    pub transcoder: TranscoderConfig,
}

/// Paths, binaries and timing knobs used by the transcoding worker.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscoderConfig {
    pub queue_key: String,
    /// Root that `Upload::stored_path` is relative to.
    pub uploads_root: PathBuf,
    /// Transient per-job work directories live under here.
    pub work_root: PathBuf,
    /// Permanent HLS output, one directory per episode.
    pub storage_root: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub hls_segment_seconds: u32,
    pub queue_pop_timeout: Duration,
    pub poll_backoff: Duration,
    pub probe_timeout: Duration,
    pub encode_timeout_min: Duration,
    pub encode_timeout_multiplier: f64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            redis_url: env::get_or(EnvKey::RedisUrl, "redis://localhost:6379"),
            worker_enabled: env::get_parsed(EnvKey::WorkerEnabled, true),
            transcoder: TranscoderConfig::from_env(),
        })
    }
}

impl TranscoderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_key: env::get_or(EnvKey::QueueKey, &defaults.queue_key),
            uploads_root: env::get(EnvKey::UploadsPath)
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_root),
            work_root: env::get(EnvKey::WorkDir)
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            storage_root: env::get(EnvKey::StorageRoot)
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, &defaults.ffmpeg_bin),
            ffprobe_bin: env::get_or(EnvKey::FfprobeBin, &defaults.ffprobe_bin),
            hls_segment_seconds: env::get_parsed(
                EnvKey::HlsSegmentSeconds,
                defaults.hls_segment_seconds,
            ),
            queue_pop_timeout: Duration::from_secs(env::get_parsed(
                EnvKey::QueuePopTimeoutSecs,
                defaults.queue_pop_timeout.as_secs(),
            )),
            poll_backoff: Duration::from_secs(env::get_parsed(
                EnvKey::PollBackoffSecs,
                defaults.poll_backoff.as_secs(),
            )),
            probe_timeout: Duration::from_secs(env::get_parsed(
                EnvKey::ProbeTimeoutSecs,
                defaults.probe_timeout.as_secs(),
            )),
            encode_timeout_min: Duration::from_secs(env::get_parsed(
                EnvKey::EncodeTimeoutMinSecs,
                defaults.encode_timeout_min.as_secs(),
            )),
            encode_timeout_multiplier: env::get_parsed(
                EnvKey::EncodeTimeoutMultiplier,
                defaults.encode_timeout_multiplier,
            ),
        }
    }

    pub fn ffmpeg_settings(&self) -> FfmpegSettings {
        FfmpegSettings {
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            segment_seconds: self.hls_segment_seconds,
            timeout_min: self.encode_timeout_min,
            timeout_multiplier: self.encode_timeout_multiplier,
        }
    }

    /// Per-job scratch directory.
    pub fn work_dir(&self, job_id: uuid::Uuid) -> PathBuf {
        self.work_root.join(job_id.to_string())
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            queue_key: "transcoding:queue".to_string(),
            uploads_root: PathBuf::from("/opt/strelitzia/storage"),
            work_root: PathBuf::from("/tmp/transcoding-workdir"),
            storage_root: PathBuf::from("/videos"),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            hls_segment_seconds: 6,
            queue_pop_timeout: Duration::from_secs(5),
            poll_backoff: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(60),
            encode_timeout_min: Duration::from_secs(600),
            encode_timeout_multiplier: 4.0,
        }
    }
}
