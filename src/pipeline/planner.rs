//! Picks the renditions to produce for a source.

use super::probe::MediaInfo;
use thiserror::Error;

pub const PASSTHROUGH_NAME: &str = "original";

/// Bandwidth advertised for a pass-through rendition when the source bit rate
/// is unknown.
pub const PASSTHROUGH_FALLBACK_BANDWIDTH: u64 = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenditionMode {
    /// Re-encode to the rendition's size and bitrates.
    Transcode,
    /// Stream copy at source resolution.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// bits/second
    pub video_bitrate: u64,
    /// bits/second
    pub audio_bitrate: u64,
    pub mode: RenditionMode,
}

impl Rendition {
    pub fn bandwidth(&self) -> u64 {
        self.video_bitrate + self.audio_bitrate
    }

    pub fn playlist_path(&self) -> String {
        format!("{}/playlist.m3u8", self.name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rung {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
}

impl Rung {
    fn to_rendition(self) -> Rendition {
        Rendition {
            name: self.name.to_string(),
            width: self.width,
            height: self.height,
            video_bitrate: self.video_bitrate,
            audio_bitrate: self.audio_bitrate,
            mode: RenditionMode::Transcode,
        }
    }
}

/// Ascending by height.
pub const LADDER: [Rung; 4] = [
    Rung {
        name: "360p",
        width: 640,
        height: 360,
        video_bitrate: 800_000,
        audio_bitrate: 128_000,
    },
    Rung {
        name: "480p",
        width: 854,
        height: 480,
        video_bitrate: 1_500_000,
        audio_bitrate: 128_000,
    },
    Rung {
        name: "720p",
        width: 1280,
        height: 720,
        video_bitrate: 3_500_000,
        audio_bitrate: 192_000,
    },
    Rung {
        name: "1080p",
        width: 1920,
        height: 1080,
        video_bitrate: 6_000_000,
        audio_bitrate: 192_000,
    },
];

pub fn ladder_floor() -> u32 {
    LADDER[0].height
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingPreferences {
    /// The ladder tops out at 1080p, so larger sources are always downscaled;
    /// kept so the preference round-trips into the job summary.
    pub prefer_downscale_to_1080: bool,
    pub keep_original: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("source height {height}p is below the lowest rendition ({floor}p)")]
pub struct UnsupportedResolution {
    pub height: u32,
    pub floor: u32,
}

/// Renditions to encode, in processing order: qualifying ladder rungs from
/// smallest to largest, then the pass-through if one was requested.
pub fn plan(
    source: &MediaInfo,
    preferences: &EncodingPreferences,
) -> Result<Vec<Rendition>, UnsupportedResolution> {
    let mut renditions: Vec<Rendition> = LADDER
        .iter()
        .filter(|rung| source.height >= rung.height)
        .map(|rung| rung.to_rendition())
        .collect();

    if renditions.is_empty() {
        return Err(UnsupportedResolution {
            height: source.height,
            floor: ladder_floor(),
        });
    }

    let matches_rung = LADDER.iter().any(|rung| rung.height == source.height);
    if preferences.keep_original && !matches_rung {
        renditions.push(Rendition {
            name: PASSTHROUGH_NAME.to_string(),
            width: source.width,
            height: source.height,
            video_bitrate: source.bit_rate.unwrap_or(PASSTHROUGH_FALLBACK_BANDWIDTH),
            audio_bitrate: 0,
            mode: RenditionMode::Passthrough,
        });
    }

    Ok(renditions)
}
