//! Per-rendition HLS encoding with `ffmpeg`.

use super::planner::{Rendition, RenditionMode};
use super::process::{self, ProcessError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const RENDITION_PLAYLIST: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("could not prepare output directory for {rendition}")]
    Io {
        rendition: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder for {rendition} could not run")]
    Process {
        rendition: String,
        #[source]
        source: ProcessError,
    },

    #[error("encoder for {rendition} exited with {}: {stderr}", exit_code_label(.code))]
    Failed {
        rendition: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl EncodeError {
    pub fn rendition(&self) -> &str {
        match self {
            EncodeError::Io { rendition, .. }
            | EncodeError::Process { rendition, .. }
            | EncodeError::Failed { rendition, .. } => rendition,
        }
    }
}

/// One rendition's encode request.
#[derive(Debug, Clone)]
pub struct EncodeJob<'a> {
    pub input: &'a Path,
    pub rendition: &'a Rendition,
    /// Directory that receives the playlist and segments.
    pub output_dir: &'a Path,
    pub source_duration_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct EncodedRendition {
    pub rendition: Rendition,
    pub playlist: PathBuf,
    pub elapsed: Duration,
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, job: EncodeJob<'_>) -> Result<EncodedRendition, EncodeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub ffmpeg_bin: String,
    pub segment_seconds: u32,
    pub timeout_min: Duration,
    pub timeout_multiplier: f64,
}

pub struct FfmpegEncoder {
    settings: FfmpegSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    fn timeout_for(&self, duration_seconds: f64) -> Duration {
        let scaled = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            Duration::from_secs_f64(duration_seconds * self.settings.timeout_multiplier)
        } else {
            Duration::ZERO
        };
        scaled.max(self.settings.timeout_min)
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, job: EncodeJob<'_>) -> Result<EncodedRendition, EncodeError> {
        let rendition = job.rendition;
        tokio::fs::create_dir_all(job.output_dir)
            .await
            .map_err(|source| EncodeError::Io {
                rendition: rendition.name.clone(),
                source,
            })?;

        let args = ffmpeg_args(job.input, rendition, job.output_dir, self.settings.segment_seconds);
        let timeout = self.timeout_for(job.source_duration_seconds);
        info!(
            rendition = %rendition.name,
            timeout_secs = timeout.as_secs(),
            "Starting ffmpeg"
        );

        let started = std::time::Instant::now();
        let output = process::run(&self.settings.ffmpeg_bin, &args, timeout)
            .await
            .map_err(|source| EncodeError::Process {
                rendition: rendition.name.clone(),
                source,
            })?;

        if !output.success() {
            return Err(EncodeError::Failed {
                rendition: rendition.name.clone(),
                code: output.status.code(),
                stderr: output.stderr_tail(15),
            });
        }

        Ok(EncodedRendition {
            rendition: rendition.clone(),
            playlist: job.output_dir.join(RENDITION_PLAYLIST),
            elapsed: started.elapsed(),
        })
    }
}

/// Full ffmpeg argument list for one rendition.
pub fn ffmpeg_args(
    input: &Path,
    rendition: &Rendition,
    output_dir: &Path,
    segment_seconds: u32,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.display().to_string(),
    ];

    match rendition.mode {
        RenditionMode::Transcode => {
            let (w, h) = (rendition.width, rendition.height);
            let video_k = rendition.video_bitrate / 1000;
            let video_bitrate = format!("{video_k}k");
            let maxrate = format!("{}k", video_k * 3 / 2);
            let bufsize = format!("{}k", video_k * 2);
            let filter = format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
            );
            let audio_bitrate = format!("{}k", rendition.audio_bitrate / 1000);
            args.extend(
                [
                    "-c:v",
                    "libx264",
                    "-preset",
                    "medium",
                    "-b:v",
                    video_bitrate.as_str(),
                    "-maxrate",
                    maxrate.as_str(),
                    "-bufsize",
                    bufsize.as_str(),
                    "-vf",
                    filter.as_str(),
                    "-c:a",
                    "aac",
                    "-b:a",
                    audio_bitrate.as_str(),
                    "-ar",
                    "48000",
                ]
                .map(String::from),
            );
        }
        RenditionMode::Passthrough => {
            args.extend(["-c:v", "copy", "-c:a", "copy"].map(String::from));
        }
    }

    let segment_time = segment_seconds.to_string();
    let segment_template = output_dir.join(SEGMENT_PATTERN).display().to_string();
    let playlist = output_dir.join(RENDITION_PLAYLIST).display().to_string();
    args.extend(
        [
            "-f",
            "hls",
            "-hls_time",
            segment_time.as_str(),
            "-hls_playlist_type",
            "vod",
            "-hls_list_size",
            "0",
            "-hls_segment_type",
            "mpegts",
            "-start_number",
            "0",
            "-hls_segment_filename",
            segment_template.as_str(),
            playlist.as_str(),
        ]
        .map(String::from),
    );

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::planner::LADDER;

    fn rendition_720() -> Rendition {
        Rendition {
            name: "720p".to_string(),
            width: 1280,
            height: 720,
            video_bitrate: LADDER[2].video_bitrate,
            audio_bitrate: LADDER[2].audio_bitrate,
            mode: RenditionMode::Transcode,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn transcode_args_scale_with_padding_and_set_bitrates() {
        let args = ffmpeg_args(Path::new("/in/src.mkv"), &rendition_720(), Path::new("/work/j/720p"), 6);

        assert_eq!(value_after(&args, "-i"), "/in/src.mkv");
        assert_eq!(value_after(&args, "-loglevel"), "error");
        assert!(args.iter().any(|a| a == "-nostats"));
        assert_eq!(value_after(&args, "-b:v"), "3500k");
        assert_eq!(value_after(&args, "-maxrate"), "5250k");
        assert_eq!(value_after(&args, "-bufsize"), "7000k");
        assert_eq!(value_after(&args, "-b:a"), "192k");
        assert_eq!(
            value_after(&args, "-vf"),
            "scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2"
        );
        assert_eq!(value_after(&args, "-hls_time"), "6");
        assert_eq!(value_after(&args, "-hls_segment_filename"), "/work/j/720p/segment_%03d.ts");
        assert_eq!(args.last().unwrap(), "/work/j/720p/playlist.m3u8");
    }

    #[test]
    fn passthrough_copies_streams() {
        let mut rendition = rendition_720();
        rendition.name = "original".to_string();
        rendition.mode = RenditionMode::Passthrough;
        let args = ffmpeg_args(Path::new("/in/src.mkv"), &rendition, Path::new("/out"), 10);

        assert_eq!(value_after(&args, "-c:v"), "copy");
        assert_eq!(value_after(&args, "-c:a"), "copy");
        assert!(!args.iter().any(|a| a == "-vf"));
    }

    #[test]
    fn timeout_scales_with_duration_above_floor() {
        let encoder = FfmpegEncoder::new(FfmpegSettings {
            ffmpeg_bin: "ffmpeg".to_string(),
            segment_seconds: 6,
            timeout_min: Duration::from_secs(600),
            timeout_multiplier: 4.0,
        });
        assert_eq!(encoder.timeout_for(3600.0), Duration::from_secs(4 * 3600));
        assert_eq!(encoder.timeout_for(10.0), Duration::from_secs(600));
        assert_eq!(encoder.timeout_for(f64::NAN), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn non_zero_exit_names_the_rendition() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(FfmpegSettings {
            ffmpeg_bin: "false".to_string(),
            segment_seconds: 6,
            timeout_min: Duration::from_secs(5),
            timeout_multiplier: 1.0,
        });
        let rendition = rendition_720();

        let err = encoder
            .encode(EncodeJob {
                input: Path::new("/in/src.mkv"),
                rendition: &rendition,
                output_dir: &dir.path().join("720p"),
                source_duration_seconds: 1.0,
            })
            .await
            .unwrap_err();

        assert_eq!(err.rendition(), "720p");
        assert!(matches!(err, EncodeError::Failed { code: Some(1), .. }));
        assert!(err.to_string().contains("status 1"));
    }
}
