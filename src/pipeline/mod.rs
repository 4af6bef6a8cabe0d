//! Stages of turning one uploaded source into a published HLS ladder.

pub mod encoder;
pub mod error;
pub mod finalizer;
pub mod planner;
pub mod playlist;
pub mod probe;
pub mod process;

pub use error::{SourceError, TranscodeError};
