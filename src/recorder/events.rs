//! Events emitted by a recording session
//!
//! Delivered over an unbounded channel so the capture context never blocks
//! on a slow consumer.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecordingEvent {
    #[serde(rename_all = "camelCase")]
    SessionStarted { session_id: Uuid, label: String },

    /// A segment was finalized with at least one frame
    #[serde(rename_all = "camelCase")]
    SegmentCompleted {
        number: u32,
        path: PathBuf,
        label: String,
        start_time: DateTime<Local>,
    },

    /// Human-readable progress
    Status { message: String },

    /// Fatal: the session has stopped
    RecordingError { message: String },

    #[serde(rename_all = "camelCase")]
    SessionStopped { session_id: Uuid },
}

impl RecordingEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<RecordingEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RecordingEvent>;

/// Send without caring whether anyone is still listening.
pub(crate) fn emit(tx: &EventSender, event: RecordingEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("Event receiver dropped");
    }
}
