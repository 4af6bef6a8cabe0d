use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    QueueKey,
    UploadsPath,
    WorkDir,
    StorageRoot,
    FfmpegBin,
    FfprobeBin,
    HlsSegmentSeconds,
    QueuePopTimeoutSecs,
    PollBackoffSecs,
    ProbeTimeoutSecs,
    EncodeTimeoutMinSecs,
    EncodeTimeoutMultiplier,
    WorkerEnabled,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::QueueKey => "TRANSCODING_QUEUE_KEY",
            EnvKey::UploadsPath => "UPLOADS_PATH",
            EnvKey::WorkDir => "WORK_DIR",
            EnvKey::StorageRoot => "STORAGE_ROOT",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::FfprobeBin => "FFPROBE_BIN",
            EnvKey::HlsSegmentSeconds => "HLS_SEGMENT_SECONDS",
            EnvKey::QueuePopTimeoutSecs => "QUEUE_POP_TIMEOUT_SECS",
            EnvKey::PollBackoffSecs => "POLL_BACKOFF_SECS",
            EnvKey::ProbeTimeoutSecs => "PROBE_TIMEOUT_SECS",
            EnvKey::EncodeTimeoutMinSecs => "ENCODE_TIMEOUT_MIN_SECS",
            EnvKey::EncodeTimeoutMultiplier => "ENCODE_TIMEOUT_MULTIPLIER",
            EnvKey::WorkerEnabled => "WORKER_ENABLED",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
