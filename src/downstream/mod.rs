//! Work that runs on completed segments
//!
//! Each finalized segment is handed to every registered [`SegmentSink`] on
//! its own tokio task. The tasks are tracked in [`DownstreamTasks`] so that
//! stopping a session can wait for them.

pub mod ffmpeg;

pub use ffmpeg::FfmpegConverter;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A finalized segment ready for downstream processing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSegment {
    pub number: u32,
    pub path: PathBuf,
    pub label: String,
    pub start_time: DateTime<Local>,
    pub frame_count: u32,
    pub frame_rate: f64,
}

/// Consumer of completed segments (conversion, upload, ...).
///
/// Failures are logged and never affect the recording.
#[async_trait]
pub trait SegmentSink: Send + Sync {
    fn name(&self) -> &str;

    async fn on_segment_ready(&self, segment: CompletedSegment) -> anyhow::Result<()>;
}

/// Registry of in-flight downstream tasks
#[derive(Debug, Clone, Default)]
pub struct DownstreamTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DownstreamTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on `runtime` and track it. Callable from blocking threads.
    pub fn spawn<F>(&self, runtime: &Handle, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = runtime.spawn(task);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Run every segment sink for `segment` as tracked tasks.
    pub fn dispatch(
        &self,
        runtime: &Handle,
        sinks: &[Arc<dyn SegmentSink>],
        segment: &CompletedSegment,
    ) {
        for sink in sinks {
            let sink = sink.clone();
            let segment = segment.clone();
            self.spawn(runtime, async move {
                let number = segment.number;
                match sink.on_segment_ready(segment).await {
                    Ok(()) => tracing::debug!(segment = number, "{} finished", sink.name()),
                    Err(e) => tracing::warn!(segment = number, "{} failed: {:#}", sink.name(), e),
                }
            });
        }
    }

    /// Tasks not yet finished
    pub fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every tracked task, including ones spawned while draining.
    pub async fn drain(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                break;
            }
            tracing::debug!("Waiting for {} downstream tasks", handles.len());
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Downstream task panicked: {}", e);
                }
            }
        }
    }

    /// [`drain`](Self::drain) with an upper bound. Returns `false` on timeout,
    /// leaving the remaining tasks running.
    pub async fn drain_timeout(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.drain()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "Gave up on downstream tasks after {:.1}s",
                    timeout.as_secs_f64()
                );
                false
            }
        }
    }
}
