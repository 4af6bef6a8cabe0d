//! Source inspection with `ffprobe`.

use super::process::{self, ProcessError};
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Stream metadata the planner needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub has_video_stream: bool,
    /// Container bit rate in bits/second when ffprobe reports one.
    pub bit_rate: Option<u64>,
    pub video_codec: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("source file is not readable: {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ffprobe could not run")]
    Process(#[from] ProcessError),

    #[error("ffprobe rejected the source (exit {code:?}): {stderr}")]
    InvalidMedia { code: Option<i32>, stderr: String },

    #[error("unparseable ffprobe output")]
    Parse(#[from] serde_json::Error),

    #[error("source contains no video stream")]
    NoVideoStream,
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}

pub struct FfprobeProber {
    ffprobe_bin: String,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        tokio::fs::File::open(path)
            .await
            .map_err(|source| ProbeError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let args: [&OsStr; 7] = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ];
        let output = process::run(&self.ffprobe_bin, args, self.timeout).await?;

        if !output.success() {
            return Err(ProbeError::InvalidMedia {
                code: output.status.code(),
                stderr: output.stderr_tail(10),
            });
        }

        let info = parse_probe_output(&output.stdout)?;
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration = info.duration_seconds,
            "Probed source"
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Turns `ffprobe -print_format json -show_format -show_streams` output into
/// [`MediaInfo`]. Only the first video stream is considered.
pub fn parse_probe_output(stdout: &[u8]) -> Result<MediaInfo, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ProbeError::NoVideoStream),
    };

    let format = parsed.format.as_ref();
    let duration_seconds = format
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let bit_rate = format
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok());

    Ok(MediaInfo {
        width,
        height,
        duration_seconds,
        has_video_stream: true,
        bit_rate,
        video_codec: video.codec_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            { "index": 0, "codec_type": "audio", "codec_name": "aac" },
            { "index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080 }
        ],
        "format": { "duration": "1432.512000", "bit_rate": "5123456" }
    }"#;

    #[test]
    fn parses_first_video_stream() {
        let info = parse_probe_output(SAMPLE.as_bytes()).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!(info.has_video_stream);
        assert!((info.duration_seconds - 1432.512).abs() < 1e-6);
        assert_eq!(info.bit_rate, Some(5_123_456));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
    }

    #[test]
    fn audio_only_source_is_rejected() {
        let raw = r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"10.0"}}"#;
        let err = parse_probe_output(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn garbage_output_is_a_parse_error() {
        let err = parse_probe_output(b"not json").unwrap_err();
        assert!(matches!(err, ProbeError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let prober = FfprobeProber::new("ffprobe", Duration::from_secs(5));
        let err = prober
            .probe(Path::new("/nonexistent/source.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unreadable { .. }));
    }
}
