//! Error types and handling
//!
//! Common error types used across the application.

use crate::avi::{ProbeError, WriterError};
use crate::capture::RegionError;
use crate::config::SettingsError;
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Container error: {0}")]
    Container(#[from] WriterError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("{0}")]
    InvalidInput(String),
}

/// Error response for a UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Settings(_) => "SETTINGS_ERROR",
            AppError::Region(_) => "REGION_ERROR",
            AppError::Container(_) => "CONTAINER_ERROR",
            AppError::Probe(_) => "PROBE_ERROR",
            AppError::Recording(RecordingError::AlreadyRecording) => "ALREADY_RECORDING",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
