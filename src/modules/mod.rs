pub mod media;
pub mod transcoding;
