//! Publishes a finished work directory and closes out the job.
//!
//! Each step can be repeated safely:
//! 1. copy the work tree to `<storage_root>/<episode_id>/` (overwrite) and
//!    drop entries the work tree no longer has,
//! 2. point the episode at the published master playlist,
//! 3. mark the job `success` with its output summary; if that fails the
//!    episode goes back to its previous path,
//! 4. delete the source upload unless it is being kept,
//! 5. remove the work directory.
//!
//! Steps 4 and 5 run after the job is terminal, so their failures are
//! reported as warnings instead of errors.

use super::planner::Rendition;
use super::playlist::MASTER_PLAYLIST;
use crate::common::error::StoreError;
use crate::modules::media::store::EpisodeStore;
use crate::modules::transcoding::model::{JobStatus, JobUpdate, PresetInfo, TranscodingJob};
use crate::modules::transcoding::store::JobStore;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("copying {} to permanent storage failed", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("updating episode playback path failed")]
    Episode(#[source] StoreError),

    #[error("marking job successful failed")]
    Job(#[source] StoreError),
}

pub struct FinalizeRequest<'a> {
    pub job_id: Uuid,
    pub episode_id: Uuid,
    pub work_dir: &'a Path,
    pub source_path: &'a Path,
    pub renditions: &'a [Rendition],
    pub keep_original: bool,
}

#[derive(Debug)]
pub struct FinalizeOutcome {
    pub job: TranscodingJob,
    pub output_dir: PathBuf,
    pub master_playlist: PathBuf,
    /// Non-fatal cleanup problems, for the job log.
    pub warnings: Vec<String>,
}

pub struct Finalizer {
    jobs: Arc<dyn JobStore>,
    episodes: Arc<dyn EpisodeStore>,
    storage_root: PathBuf,
}

impl Finalizer {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        episodes: Arc<dyn EpisodeStore>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            jobs,
            episodes,
            storage_root: storage_root.into(),
        }
    }

    pub fn output_dir(&self, episode_id: Uuid) -> PathBuf {
        self.storage_root.join(episode_id.to_string())
    }

    pub async fn finalize(
        &self,
        request: FinalizeRequest<'_>,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let output_dir = self.output_dir(request.episode_id);
        let master_playlist = publish_tree(request.work_dir, &output_dir).await?;
        let master_str = master_playlist.display().to_string();

        let previous_path = self
            .episodes
            .get(request.episode_id)
            .await
            .map_err(FinalizeError::Episode)?
            .filesystem_path;
        self.episodes
            .set_filesystem_path(request.episode_id, Some(master_str.as_str()))
            .await
            .map_err(FinalizeError::Episode)?;

        let summary = completion_summary(request.renditions, &output_dir, &master_playlist);
        let job = match self
            .jobs
            .update_status(
                request.job_id,
                JobStatus::Success,
                JobUpdate::finished_now().with_preset(summary),
            )
            .await
        {
            Ok(job) => job,
            Err(e) => {
                if let Err(restore) = self
                    .episodes
                    .set_filesystem_path(request.episode_id, previous_path.as_deref())
                    .await
                {
                    error!(
                        episode_id = %request.episode_id,
                        error = %restore,
                        "Could not restore episode playback path"
                    );
                }
                return Err(FinalizeError::Job(e));
            }
        };

        info!(
            job_id = %request.job_id,
            episode_id = %request.episode_id,
            output = %output_dir.display(),
            "Published HLS output"
        );

        let mut warnings = Vec::new();
        if !request.keep_original {
            if let Err(e) = remove_file_if_present(request.source_path).await {
                warn!(path = %request.source_path.display(), error = %e, "Could not delete source upload");
                warnings.push(format!(
                    "could not delete source {}: {e}",
                    request.source_path.display()
                ));
            }
        }
        if let Err(e) = remove_dir_if_present(request.work_dir).await {
            warn!(path = %request.work_dir.display(), error = %e, "Could not remove work directory");
            warnings.push(format!(
                "could not remove work directory {}: {e}",
                request.work_dir.display()
            ));
        }

        Ok(FinalizeOutcome {
            job,
            output_dir,
            master_playlist,
            warnings,
        })
    }
}

fn completion_summary(renditions: &[Rendition], output_dir: &Path, master: &Path) -> PresetInfo {
    let names: Vec<Value> = renditions
        .iter()
        .map(|r| Value::String(r.name.clone()))
        .collect();
    PresetInfo::new()
        .with(PresetInfo::RESOLUTIONS, names)
        .with(PresetInfo::OUTPUT_DIR, output_dir.display().to_string())
        .with(PresetInfo::MASTER_PLAYLIST_PATH, master.display().to_string())
}

/// Copies every file under `work_dir` into `output_dir`, overwriting. The
/// top-level master playlist is written last, via a temp file and rename, so
/// it only appears once every rendition it references is in place. Entries
/// left by an earlier publish that the work tree no longer has are removed
/// after the new master is live.
pub async fn publish_tree(work_dir: &Path, output_dir: &Path) -> Result<PathBuf, FinalizeError> {
    let copy_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| FinalizeError::Copy { path, source }
    };

    let work_master = work_dir.join(MASTER_PLAYLIST);
    tokio::fs::metadata(&work_master)
        .await
        .map_err(copy_err(&work_master))?;

    let mut pending = vec![PathBuf::new()];
    while let Some(relative) = pending.pop() {
        let src_dir = work_dir.join(&relative);
        let dst_dir = output_dir.join(&relative);
        tokio::fs::create_dir_all(&dst_dir)
            .await
            .map_err(copy_err(&dst_dir))?;

        let mut entries = tokio::fs::read_dir(&src_dir)
            .await
            .map_err(copy_err(&src_dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(copy_err(&src_dir))? {
            let file_type = entry.file_type().await.map_err(copy_err(&entry.path()))?;
            let name = entry.file_name();
            if file_type.is_dir() {
                pending.push(relative.join(&name));
            } else if relative.as_os_str().is_empty() && name == MASTER_PLAYLIST {
                continue;
            } else {
                let dst = dst_dir.join(&name);
                tokio::fs::copy(entry.path(), &dst)
                    .await
                    .map_err(copy_err(&dst))?;
            }
        }
    }

    let master = output_dir.join(MASTER_PLAYLIST);
    let staging = output_dir.join(format!(".{MASTER_PLAYLIST}.tmp"));
    tokio::fs::copy(&work_master, &staging)
        .await
        .map_err(copy_err(&staging))?;
    tokio::fs::rename(&staging, &master)
        .await
        .map_err(copy_err(&master))?;

    prune_stale(work_dir, output_dir).await?;
    Ok(master)
}

async fn prune_stale(work_dir: &Path, output_dir: &Path) -> Result<(), FinalizeError> {
    let remove_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| FinalizeError::Copy { path, source }
    };

    let mut pending = vec![PathBuf::new()];
    while let Some(relative) = pending.pop() {
        let dst_dir = output_dir.join(&relative);
        let mut entries = tokio::fs::read_dir(&dst_dir)
            .await
            .map_err(remove_err(&dst_dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(remove_err(&dst_dir))? {
            let name = entry.file_name();
            if relative.as_os_str().is_empty() && name == MASTER_PLAYLIST {
                continue;
            }
            let path = entry.path();
            let is_dir = entry.file_type().await.map_err(remove_err(&path))?.is_dir();
            let in_work = tokio::fs::try_exists(work_dir.join(&relative).join(&name))
                .await
                .map_err(remove_err(&path))?;
            match (in_work, is_dir) {
                (true, true) => pending.push(relative.join(&name)),
                (true, false) => {}
                (false, true) => tokio::fs::remove_dir_all(&path)
                    .await
                    .map_err(remove_err(&path))?,
                (false, false) => tokio::fs::remove_file(&path)
                    .await
                    .map_err(remove_err(&path))?,
            }
        }
    }
    Ok(())
}

async fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub(crate) async fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::media::memory::InMemoryEpisodeStore;
    use crate::modules::media::model::Episode;
    use crate::modules::transcoding::memory::InMemoryJobStore;
    use crate::modules::transcoding::model::NewJob;
    use crate::pipeline::planner::RenditionMode;
    use std::collections::BTreeMap;

    fn write(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn seed_work_dir(dir: &Path) {
        write(&dir.join("master.m3u8"), b"#EXTM3U\n720p/playlist.m3u8\n");
        write(&dir.join("720p/playlist.m3u8"), b"#EXTM3U\nsegment_000.ts\n");
        write(&dir.join("720p/segment_000.ts"), &[0x47, 1, 2, 3]);
        write(&dir.join("720p/segment_001.ts"), &[0x47, 4, 5, 6]);
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_path_buf();
                    files.insert(rel, std::fs::read(&path).unwrap());
                }
            }
        }
        files
    }

    #[tokio::test]
    async fn publishing_twice_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        let out = tmp.path().join("videos/ep");
        seed_work_dir(&work);

        publish_tree(&work, &out).await.unwrap();
        let first = snapshot(&out);
        publish_tree(&work, &out).await.unwrap();
        let second = snapshot(&out);

        assert_eq!(first, second);
        assert_eq!(first, snapshot(&work));
    }

    #[tokio::test]
    async fn republishing_drops_renditions_no_longer_planned() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("work/first");
        let second = tmp.path().join("work/second");
        let out = tmp.path().join("videos/ep");
        seed_work_dir(&first);
        write(&first.join("1080p/playlist.m3u8"), b"#EXTM3U\nsegment_000.ts\n");
        write(&first.join("1080p/segment_000.ts"), &[0x47, 9]);
        write(&first.join("720p/segment_002.ts"), &[0x47, 7]);
        seed_work_dir(&second);

        publish_tree(&first, &out).await.unwrap();
        assert!(out.join("1080p/segment_000.ts").exists());
        publish_tree(&second, &out).await.unwrap();

        assert!(!out.join("1080p").exists());
        assert_eq!(snapshot(&out), snapshot(&second));
    }

    #[tokio::test]
    async fn missing_master_publishes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        let out = tmp.path().join("out");
        write(&work.join("720p/playlist.m3u8"), b"#EXTM3U\n");

        let err = publish_tree(&work, &out).await.unwrap_err();

        assert!(matches!(err, FinalizeError::Copy { .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn finalize_updates_episode_job_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work/job");
        let source = tmp.path().join("uploads/source.mkv");
        seed_work_dir(&work);
        write(&source, b"source");

        let jobs = Arc::new(InMemoryJobStore::new());
        let episodes = Arc::new(InMemoryEpisodeStore::new());
        let episode_id = Uuid::new_v4();
        episodes
            .insert(Episode {
                id: episode_id,
                title: None,
                filesystem_path: None,
            })
            .await;
        let job = jobs
            .create(NewJob {
                episode_id,
                upload_id: Uuid::new_v4(),
                created_by_id: Uuid::new_v4(),
                preset_info: PresetInfo::new(),
            })
            .await
            .unwrap();
        jobs.update_status(job.id, JobStatus::Running, JobUpdate::started_now())
            .await
            .unwrap();

        let finalizer = Finalizer::new(jobs.clone(), episodes.clone(), tmp.path().join("videos"));
        let renditions = [Rendition {
            name: "720p".to_string(),
            width: 1280,
            height: 720,
            video_bitrate: 3_500_000,
            audio_bitrate: 192_000,
            mode: RenditionMode::Transcode,
        }];
        let outcome = finalizer
            .finalize(FinalizeRequest {
                job_id: job.id,
                episode_id,
                work_dir: &work,
                source_path: &source,
                renditions: &renditions,
                keep_original: false,
            })
            .await
            .unwrap();

        let expected_master = tmp.path().join(format!("videos/{episode_id}/master.m3u8"));
        assert_eq!(outcome.master_playlist, expected_master);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.job.status, JobStatus::Success);
        assert!(outcome.job.finished_at.is_some());
        assert_eq!(outcome.job.preset().resolutions(), vec!["720p".to_string()]);

        let episode = episodes.get(episode_id).await.unwrap();
        assert_eq!(
            episode.filesystem_path.as_deref(),
            Some(expected_master.to_str().unwrap())
        );
        assert!(!source.exists());
        assert!(!work.exists());
    }

    #[tokio::test]
    async fn keep_original_leaves_source_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work/job");
        let source = tmp.path().join("uploads/source.mkv");
        seed_work_dir(&work);
        write(&source, b"source");

        let jobs = Arc::new(InMemoryJobStore::new());
        let episodes = Arc::new(InMemoryEpisodeStore::new());
        let episode_id = Uuid::new_v4();
        episodes
            .insert(Episode {
                id: episode_id,
                title: None,
                filesystem_path: None,
            })
            .await;
        let job = jobs
            .create(NewJob {
                episode_id,
                upload_id: Uuid::new_v4(),
                created_by_id: Uuid::new_v4(),
                preset_info: PresetInfo::new(),
            })
            .await
            .unwrap();
        jobs.update_status(job.id, JobStatus::Running, JobUpdate::started_now())
            .await
            .unwrap();

        let finalizer = Finalizer::new(jobs, episodes, tmp.path().join("videos"));
        finalizer
            .finalize(FinalizeRequest {
                job_id: job.id,
                episode_id,
                work_dir: &work,
                source_path: &source,
                renditions: &[],
                keep_original: true,
            })
            .await
            .unwrap();

        assert!(source.exists());
    }

    #[tokio::test]
    async fn failed_success_write_restores_previous_episode_path() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work/job");
        let source = tmp.path().join("uploads/source.mkv");
        seed_work_dir(&work);
        write(&source, b"source");

        let jobs = Arc::new(InMemoryJobStore::new());
        let episodes = Arc::new(InMemoryEpisodeStore::new());
        let episode_id = Uuid::new_v4();
        episodes
            .insert(Episode {
                id: episode_id,
                title: None,
                filesystem_path: Some("/srv/old/master.m3u8".to_string()),
            })
            .await;
        let job = jobs
            .create(NewJob {
                episode_id,
                upload_id: Uuid::new_v4(),
                created_by_id: Uuid::new_v4(),
                preset_info: PresetInfo::new(),
            })
            .await
            .unwrap();
        jobs.update_status(job.id, JobStatus::Cancelled, JobUpdate::finished_now())
            .await
            .unwrap();

        let finalizer = Finalizer::new(jobs.clone(), episodes.clone(), tmp.path().join("videos"));
        let err = finalizer
            .finalize(FinalizeRequest {
                job_id: job.id,
                episode_id,
                work_dir: &work,
                source_path: &source,
                renditions: &[],
                keep_original: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FinalizeError::Job(StoreError::InvalidTransition {
                from: JobStatus::Cancelled,
                ..
            })
        ));
        let episode = episodes.get(episode_id).await.unwrap();
        assert_eq!(episode.filesystem_path.as_deref(), Some("/srv/old/master.m3u8"));
        assert_eq!(jobs.get(job.id).await.unwrap().status, JobStatus::Cancelled);
        assert!(source.exists());
    }
}
