use crate::avi::WriterError;
use thiserror::Error;

/// Recording errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Segment {number} failed: {source}")]
    Segment {
        number: u32,
        #[source]
        source: WriterError,
    },

    #[error("Recording loop failed: {0}")]
    Internal(String),
}

pub type RecordingResult<T> = Result<T, RecordingError>;
