//! Recording session controller
//!
//! Runs an unbounded sequence of segments on a dedicated blocking thread,
//! reports progress over an event channel, and hands each finished segment
//! to the downstream sinks.

use super::error::{RecordingError, RecordingResult};
use super::events::{emit, EventReceiver, EventSender, RecordingEvent};
use super::naming::{sanitize_label, segment_file_name};
use super::segment::{FramePipeline, SegmentRecorder};
use super::signal::StopSignal;
use super::state::{RecordingState, SegmentOutcome, SessionConfig, SessionSummary};
use crate::capture::{CaptureRegion, Compressor, FrameSource};
use crate::downstream::{CompletedSegment, DownstreamTasks, SegmentSink};
use crate::processing::TimestampOverlay;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct ActiveSession {
    id: Uuid,
    stop: Arc<StopSignal>,
    handle: JoinHandle<RecordingResult<SessionSummary>>,
}

/// Starts and stops recording sessions
pub struct RecordingController {
    config: SessionConfig,
    source: Arc<dyn FrameSource>,
    compressor: Arc<dyn Compressor>,
    sinks: Vec<Arc<dyn SegmentSink>>,
    state: Arc<RwLock<RecordingState>>,
    event_tx: EventSender,
    active: Option<ActiveSession>,
}

impl RecordingController {
    /// Create a controller and the receiving end of its event channel.
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn FrameSource>,
        compressor: Arc<dyn Compressor>,
    ) -> (Self, EventReceiver) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let controller = Self {
            config,
            source,
            compressor,
            sinks: Vec::new(),
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            event_tx,
            active: None,
        };
        (controller, event_rx)
    }

    /// Register a consumer for completed segments. Applies to sessions
    /// started afterwards.
    pub fn add_sink(&mut self, sink: Arc<dyn SegmentSink>) {
        tracing::info!("Adding segment sink: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Begin recording `region`. Returns the new session id.
    pub async fn start(&mut self, region: CaptureRegion, label: &str) -> RecordingResult<Uuid> {
        if self.state() != RecordingState::Idle {
            return Err(RecordingError::AlreadyRecording);
        }
        // A session that ended on its own still needs joining.
        if let Some(finished) = self.active.take() {
            match finished.handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!("Previous session {} ended with: {}", finished.id, e),
                Err(e) => tracing::error!("Previous session {} task failed: {}", finished.id, e),
            }
        }

        self.config.validate()?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let id = Uuid::new_v4();
        let label = sanitize_label(label);
        let started_at = Local::now();
        let stop = Arc::new(StopSignal::new());

        tracing::info!(
            "Starting session {} ({}): {}x{} at ({}, {}), {} fps, {:.1}s segments -> {:?}",
            id,
            label,
            region.width(),
            region.height(),
            region.x(),
            region.y(),
            self.config.fps,
            self.config.segment_duration.as_secs_f64(),
            self.config.output_dir
        );

        let session = SessionLoop {
            id,
            label: label.clone(),
            started_at,
            region,
            config: self.config.clone(),
            source: self.source.clone(),
            compressor: self.compressor.clone(),
            sinks: self.sinks.clone(),
            stop: stop.clone(),
            events: self.event_tx.clone(),
            tasks: DownstreamTasks::new(),
            runtime: Handle::current(),
        };

        *self.state.write() = RecordingState::Recording;
        emit(
            &self.event_tx,
            RecordingEvent::SessionStarted {
                session_id: id,
                label,
            },
        );

        let handle = tokio::spawn(run_session(session, self.state.clone()));
        self.active = Some(ActiveSession { id, stop, handle });
        Ok(id)
    }

    /// Stop the session, wait for the current segment to finalize and for
    /// all downstream work to complete.
    ///
    /// If the session already ended on a fatal error, that error is returned.
    pub async fn stop(&mut self) -> RecordingResult<SessionSummary> {
        let active = self.active.take().ok_or(RecordingError::NotRecording)?;

        {
            let mut state = self.state.write();
            if *state == RecordingState::Recording {
                *state = RecordingState::Stopping;
            }
        }
        tracing::info!("Stopping session {}", active.id);
        active.stop.stop();

        match active.handle.await {
            Ok(result) => result,
            Err(e) => {
                *self.state.write() = RecordingState::Idle;
                Err(RecordingError::Internal(format!("session task failed: {}", e)))
            }
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            // The blocking thread still finalizes its segment.
            active.stop.stop();
        }
    }
}

/// Wraps the blocking loop: reports its outcome, drains downstream work,
/// and returns the controller to idle.
async fn run_session(
    session: SessionLoop,
    state: Arc<RwLock<RecordingState>>,
) -> RecordingResult<SessionSummary> {
    let id = session.id;
    let label = session.label.clone();
    let started_at = session.started_at;
    let events = session.events.clone();
    let tasks = session.tasks.clone();
    let stop = session.stop.clone();

    let result = match tokio::task::spawn_blocking(move || session.run()).await {
        Ok(result) => result,
        Err(e) => Err(RecordingError::Internal(format!("segment loop failed: {}", e))),
    };

    if let Err(e) = &result {
        tracing::error!("Session {} stopped on error: {}", id, e);
        emit(&events, RecordingEvent::RecordingError { message: e.to_string() });
        stop.stop();
    }

    tasks.drain().await;
    *state.write() = RecordingState::Idle;
    emit(&events, RecordingEvent::SessionStopped { session_id: id });

    let segments = result?;
    let frames = segments.iter().map(|s| s.frames as u64).sum();
    tracing::info!("Session {} stopped: {} segments, {} frames", id, segments.len(), frames);

    Ok(SessionSummary {
        session_id: id,
        label,
        started_at,
        segments,
        frames,
    })
}

/// State owned by the blocking segment loop
struct SessionLoop {
    id: Uuid,
    label: String,
    started_at: DateTime<Local>,
    region: CaptureRegion,
    config: SessionConfig,
    source: Arc<dyn FrameSource>,
    compressor: Arc<dyn Compressor>,
    sinks: Vec<Arc<dyn SegmentSink>>,
    stop: Arc<StopSignal>,
    events: EventSender,
    tasks: DownstreamTasks,
    runtime: Handle,
}

impl SessionLoop {
    fn run(&self) -> RecordingResult<Vec<SegmentOutcome>> {
        let overlay = self.config.overlay.as_ref().map(TimestampOverlay::new);
        let pipeline = FramePipeline {
            source: self.source.as_ref(),
            compressor: self.compressor.as_ref(),
            overlay: overlay.as_ref(),
            quality: self.config.jpeg_quality,
        };

        let mut outcomes = Vec::new();
        let mut number = 0u32;

        // The stop flag is never reset, so a stop between segments is seen here.
        while !self.stop.is_stopped() {
            number += 1;
            let name = segment_file_name(
                &self.label,
                self.started_at,
                number,
                &self.config.file_extension,
            );
            let path = self.config.output_dir.join(name);
            let mut recorder = SegmentRecorder::new(number, path, self.region, &self.config);
            emit(
                &self.events,
                RecordingEvent::status(format!("Recording segment {}", number)),
            );

            let recorded =
                catch_unwind(AssertUnwindSafe(|| recorder.record(&pipeline, &self.stop)));
            let outcome = match recorded {
                Ok(result) => result?,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    return Err(RecordingError::Internal(format!(
                        "segment {} panicked: {}",
                        number, message
                    )));
                }
            };

            match &outcome.container {
                Some(container) => {
                    emit(
                        &self.events,
                        RecordingEvent::SegmentCompleted {
                            number,
                            path: outcome.path.clone(),
                            label: self.label.clone(),
                            start_time: outcome.started_at,
                        },
                    );
                    let completed = CompletedSegment {
                        number,
                        path: outcome.path.clone(),
                        label: self.label.clone(),
                        start_time: outcome.started_at,
                        frame_count: container.frame_count,
                        frame_rate: container.frame_rate,
                    };
                    self.tasks.dispatch(&self.runtime, &self.sinks, &completed);
                    outcomes.push(outcome);
                }
                None => {
                    emit(
                        &self.events,
                        RecordingEvent::status(format!("Segment {} captured no frames", number)),
                    );
                }
            }
        }

        tracing::debug!("Session {} loop exited after {} segments", self.id, number);
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CompressError, RawImage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    struct BlankSource;

    impl FrameSource for BlankSource {
        fn capture(&self, region: &CaptureRegion) -> Result<RawImage, CaptureError> {
            Ok(RawImage::new(region.width(), region.height()))
        }
    }

    struct StubCompressor;

    impl Compressor for StubCompressor {
        fn compress(&self, _image: &RawImage, _quality: u8) -> Result<Vec<u8>, CompressError> {
            Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }
    }

    struct SlowSink {
        done: AtomicUsize,
    }

    #[async_trait]
    impl SegmentSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        async fn on_segment_ready(&self, _segment: CompletedSegment) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller(dir: &std::path::Path, segment_ms: u64) -> (RecordingController, EventReceiver) {
        RecordingController::new(
            SessionConfig::new(dir, 10, Duration::from_millis(segment_ms)),
            Arc::new(BlankSource),
            Arc::new(StubCompressor),
        )
    }

    fn region() -> CaptureRegion {
        CaptureRegion::new(0, 0, 64, 48).unwrap()
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let (mut controller, _events) = controller(dir.path(), 5_000);

        controller.start(region(), "a").await.unwrap();
        assert!(matches!(
            controller.start(region(), "b").await,
            Err(RecordingError::AlreadyRecording)
        ));

        controller.stop().await.unwrap();
        assert_eq!(controller.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let dir = tempdir().unwrap();
        let (mut controller, _events) = controller(dir.path(), 1_000);
        assert!(matches!(controller.stop().await, Err(RecordingError::NotRecording)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_start() {
        let dir = tempdir().unwrap();
        let (mut controller, _events) = RecordingController::new(
            SessionConfig::new(dir.path(), 0, Duration::from_secs(1)),
            Arc::new(BlankSource),
            Arc::new(StubCompressor),
        );
        assert!(matches!(
            controller.start(region(), "x").await,
            Err(RecordingError::InvalidConfig(_))
        ));
        assert_eq!(controller.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_segments_are_sequential_and_numbered() {
        let dir = tempdir().unwrap();
        let (mut controller, mut events) = controller(dir.path(), 300);

        let id = controller.start(region(), "ward 3").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let summary = controller.stop().await.unwrap();

        assert_eq!(summary.session_id, id);
        assert_eq!(summary.label, "ward_3");
        assert!(summary.segments.len() >= 3, "segments = {}", summary.segments.len());
        for (i, segment) in summary.segments.iter().enumerate() {
            assert_eq!(segment.number, i as u32 + 1);
            let name = segment.path.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("ward_3_"));
            assert!(name.ends_with(&format!("_seg{:03}.avi", i + 1)));
            assert!(segment.path.exists());
        }
        for pair in summary.segments.windows(2) {
            assert!(pair[0].started_at <= pair[1].started_at);
        }

        let mut completed = Vec::new();
        let mut saw_started = false;
        let mut saw_stopped = false;
        while let Ok(event) = events.try_recv() {
            match event {
                RecordingEvent::SessionStarted { session_id, .. } => {
                    assert_eq!(session_id, id);
                    saw_started = true;
                }
                RecordingEvent::SegmentCompleted { number, .. } => completed.push(number),
                RecordingEvent::SessionStopped { .. } => saw_stopped = true,
                RecordingEvent::RecordingError { message } => {
                    panic!("unexpected error: {}", message)
                }
                RecordingEvent::Status { .. } => {}
            }
        }
        assert!(saw_started && saw_stopped);
        assert_eq!(completed, (1..=summary.segments.len() as u32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stop_waits_for_downstream() {
        let dir = tempdir().unwrap();
        let (mut controller, _events) = controller(dir.path(), 200);
        let sink = Arc::new(SlowSink {
            done: AtomicUsize::new(0),
        });
        controller.add_sink(sink.clone());

        controller.start(region(), "sink").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let summary = controller.stop().await.unwrap();

        assert_eq!(sink.done.load(Ordering::SeqCst), summary.segments.len());
        assert!(!summary.segments.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_session_fatal() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let (mut controller, mut events) = controller(&out, 400);

        controller.start(region(), "fatal").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::remove_dir_all(&out).unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                if let RecordingEvent::RecordingError { message } = event {
                    return Some(message);
                }
            }
            None
        })
        .await
        .unwrap();

        assert!(message.unwrap().contains("Segment 1"));
        let stopped = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap();
        assert!(matches!(stopped, Some(RecordingEvent::SessionStopped { .. })));
        assert_eq!(controller.state(), RecordingState::Idle);
        assert!(matches!(
            controller.stop().await,
            Err(RecordingError::Segment { number: 1, .. })
        ));
    }
}
