use super::encoder::EncodeError;
use super::finalizer::FinalizeError;
use super::planner::UnsupportedResolution;
use super::probe::ProbeError;
use crate::common::error::StoreError;
use std::error::Error as _;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upload {0} does not exist")]
    UploadMissing(Uuid),

    #[error("upload {id} is {status}, not completed")]
    UploadNotCompleted { id: Uuid, status: String },

    #[error("episode {0} does not exist")]
    EpisodeMissing(Uuid),
}

/// Everything that can end a job as `failed`.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("probe failed")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Plan(#[from] UnsupportedResolution),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("could not write master playlist")]
    Playlist(#[source] std::io::Error),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    #[error("job store error")]
    Store(#[from] StoreError),

    #[error("job was cancelled")]
    Cancelled,
}

impl TranscodeError {
    pub fn stage(&self) -> &'static str {
        match self {
            TranscodeError::Source(_) => "source",
            TranscodeError::Probe(_) => "probe",
            TranscodeError::Plan(_) => "plan",
            TranscodeError::Encode(_) => "encode",
            TranscodeError::Playlist(_) => "playlist",
            TranscodeError::Finalize(_) => "finalize",
            TranscodeError::Store(_) => "store",
            TranscodeError::Cancelled => "cancel",
        }
    }

    /// `FINAL ERROR [stage]: message` followed by one `caused by:` line per
    /// source in the chain.
    pub fn report(&self) -> String {
        let mut report = format!("FINAL ERROR [{}]: {}", self.stage(), self);
        let mut source = self.source();
        while let Some(cause) = source {
            report.push_str("\ncaused by: ");
            report.push_str(&cause.to_string());
            source = cause.source();
        }
        report
    }
}
