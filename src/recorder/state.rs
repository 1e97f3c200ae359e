//! Recording state management
//!
//! Defines the session state machine, the per-segment phases, and the
//! records produced as segments and sessions complete.

use super::error::{RecordingError, RecordingResult};
use crate::avi::ContainerSummary;
use crate::config::{OverlaySettings, MAX_FPS, MIN_FPS};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session running
    #[default]
    Idle,
    /// Segments are being captured
    Recording,
    /// Stop requested; the current segment is finalizing
    Stopping,
}

/// Lifecycle of a single segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentPhase {
    #[default]
    Idle,
    Capturing,
    Finalizing,
    Done,
}

/// Validated runtime configuration for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub output_dir: PathBuf,
    pub fps: u32,
    pub segment_duration: Duration,
    pub jpeg_quality: u8,
    pub file_extension: String,
    /// `None` disables the timestamp overlay
    pub overlay: Option<OverlaySettings>,
}

impl SessionConfig {
    /// Config with the default quality and extension and no overlay.
    pub fn new(output_dir: impl Into<PathBuf>, fps: u32, segment_duration: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            fps,
            segment_duration,
            jpeg_quality: crate::capture::DEFAULT_JPEG_QUALITY,
            file_extension: "avi".to_string(),
            overlay: None,
        }
    }

    pub fn validate(&self) -> RecordingResult<()> {
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(RecordingError::InvalidConfig(format!(
                "fps must be between {} and {}, got {}",
                MIN_FPS, MAX_FPS, self.fps
            )));
        }
        if self.segment_duration.is_zero() {
            return Err(RecordingError::InvalidConfig(
                "segment duration must be positive".to_string(),
            ));
        }
        if self.jpeg_quality > 100 {
            return Err(RecordingError::InvalidConfig(format!(
                "JPEG quality must be at most 100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Nominal time between frame starts.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Result of one finished segment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentOutcome {
    /// 1-based within the session
    pub number: u32,
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub frames: u32,
    /// Capture, compression and dimension failures
    pub dropped: u32,
    pub elapsed: Duration,
    /// `None` when the segment captured no frames
    pub container: Option<ContainerSummary>,
}

impl SegmentOutcome {
    pub fn has_output(&self) -> bool {
        self.container.is_some()
    }
}

/// Returned by a successful stop
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub label: String,
    pub started_at: DateTime<Local>,
    /// Segments that produced a file
    pub segments: Vec<SegmentOutcome>,
    pub frames: u64,
}
