//! Media I/O errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors from decoding, encoding or resampling audio files
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported or unrecognized format: {0}")]
    Probe(String),

    #[error("No decodable audio track in {0:?}")]
    NoAudioTrack(PathBuf),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Decoded stream is empty: {0:?}")]
    EmptyStream(PathBuf),

    #[error("WAV write error: {0}")]
    Encode(#[from] hound::Error),

    #[error("Resample error: {0}")]
    Resample(String),
}

pub type MediaResult<T> = Result<T, MediaError>;
