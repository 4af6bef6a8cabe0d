use super::planner::Rendition;
use std::path::{Path, PathBuf};

pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// Multivariant playlist listing every rendition, highest bandwidth first.
pub fn compose_master(renditions: &[Rendition]) -> String {
    let mut ordered: Vec<&Rendition> = renditions.iter().collect();
    ordered.sort_by(|a, b| {
        b.bandwidth()
            .cmp(&a.bandwidth())
            .then_with(|| b.height.cmp(&a.height))
    });

    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:3".to_string(),
        "#EXT-X-INDEPENDENT-SEGMENTS".to_string(),
    ];
    for rendition in ordered {
        lines.push(format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}",
            rendition.bandwidth(),
            rendition.width,
            rendition.height
        ));
        lines.push(rendition.playlist_path());
    }

    let mut playlist = lines.join("\n");
    playlist.push('\n');
    playlist
}

pub async fn write_master(dir: &Path, renditions: &[Rendition]) -> std::io::Result<PathBuf> {
    let path = dir.join(MASTER_PLAYLIST);
    tokio::fs::write(&path, compose_master(renditions)).await?;
    Ok(path)
}
