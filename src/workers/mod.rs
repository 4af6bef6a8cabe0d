pub mod transcoder;

pub use transcoder::{JobOutcome, SkipReason, TranscodeWorker, WorkerDeps};
