//! One fixed-duration segment
//!
//! Runs the paced capture loop on the calling thread and guarantees the
//! container is finalized exactly once, whether the loop ends by elapsed
//! time, by cancellation, or by unwinding.

use super::error::{RecordingError, RecordingResult};
use super::signal::StopSignal;
use super::state::{SegmentOutcome, SegmentPhase, SessionConfig};
use crate::avi::{ContainerSummary, ContainerWriter, WriterError};
use crate::capture::{CaptureError, CaptureRegion, CompressError, Compressor, FrameSource};
use crate::processing::TimestampOverlay;
use chrono::Local;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Log the first dropped frame and then every this many
const DROP_LOG_EVERY: u32 = 50;

/// Everything a segment needs to turn a capture into a stored frame.
pub struct FramePipeline<'a> {
    pub source: &'a dyn FrameSource,
    pub compressor: &'a dyn Compressor,
    pub overlay: Option<&'a TimestampOverlay>,
    pub quality: u8,
}

/// Why a frame slot produced nothing
#[derive(Debug)]
enum DroppedFrame {
    Capture(CaptureError),
    Dimensions { expected: (u32, u32), actual: (u32, u32) },
    Compress(CompressError),
}

impl std::fmt::Display for DroppedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture(e) => write!(f, "capture failed: {}", e),
            Self::Dimensions { expected, actual } => write!(
                f,
                "captured {}x{} but region is {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            Self::Compress(e) => write!(f, "compression failed: {}", e),
        }
    }
}

/// Owns the writer for the lifetime of a segment and finalizes it on drop
/// if nothing else did.
struct FinalizeGuard {
    writer: ContainerWriter,
    started: Instant,
}

impl FinalizeGuard {
    fn finish(&mut self, elapsed: Duration) -> Result<Option<ContainerSummary>, WriterError> {
        self.writer.finalize(elapsed)
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if self.writer.is_finalized() {
            return;
        }
        let elapsed = self.started.elapsed();
        tracing::warn!(
            "Segment {:?} abandoned after {:.2}s, finalizing {} buffered frames",
            self.writer.path(),
            elapsed.as_secs_f64(),
            self.writer.frame_count()
        );
        if let Err(e) = self.writer.finalize(elapsed) {
            tracing::error!(
                "Failed to finalize abandoned segment {:?}: {}",
                self.writer.path(),
                e
            );
        }
    }
}

pub struct SegmentRecorder {
    number: u32,
    path: PathBuf,
    region: CaptureRegion,
    fps: u32,
    interval: Duration,
    duration: Duration,
    phase: SegmentPhase,
}

impl SegmentRecorder {
    pub fn new(
        number: u32,
        path: PathBuf,
        region: CaptureRegion,
        config: &SessionConfig,
    ) -> Self {
        Self {
            number,
            path,
            region,
            fps: config.fps.max(1),
            interval: config.frame_interval(),
            duration: config.segment_duration,
            phase: SegmentPhase::Idle,
        }
    }

    pub fn phase(&self) -> SegmentPhase {
        self.phase
    }

    /// Capture until the segment duration elapses or `stop` fires, then
    /// finalize. Blocks the calling thread for up to the segment duration.
    pub fn record(
        &mut self,
        pipeline: &FramePipeline<'_>,
        stop: &StopSignal,
    ) -> RecordingResult<SegmentOutcome> {
        let started_at = Local::now();
        let started = Instant::now();
        let (width, height) = self.region.dimensions();

        let mut guard = FinalizeGuard {
            writer: ContainerWriter::new(&self.path, width, height, self.fps),
            started,
        };
        self.phase = SegmentPhase::Capturing;
        tracing::debug!(segment = self.number, "Capturing {:?}", self.path);

        let mut frames = 0u32;
        let mut dropped = 0u32;

        while started.elapsed() < self.duration && !stop.is_stopped() {
            let frame_start = Instant::now();

            match self.produce_frame(pipeline) {
                Ok(jpeg) => match guard.writer.add_frame(jpeg) {
                    Ok(_) => frames += 1,
                    Err(e) => {
                        dropped += 1;
                        self.log_drop(dropped, &e);
                    }
                },
                Err(reason) => {
                    dropped += 1;
                    self.log_drop(dropped, &reason);
                }
            }

            // Never sleep past the end of the segment.
            let remaining = self.duration.saturating_sub(started.elapsed());
            let wait = self
                .interval
                .saturating_sub(frame_start.elapsed())
                .min(remaining);
            if !wait.is_zero() && stop.wait_timeout(wait) {
                break;
            }
        }

        self.phase = SegmentPhase::Finalizing;
        let elapsed = started.elapsed();
        let container = guard
            .finish(elapsed)
            .map_err(|source| RecordingError::Segment {
                number: self.number,
                source,
            })?;
        self.phase = SegmentPhase::Done;

        tracing::info!(
            segment = self.number,
            frames,
            dropped,
            "Segment done after {:.2}s{}",
            elapsed.as_secs_f64(),
            if stop.is_stopped() { " (stopped)" } else { "" }
        );

        Ok(SegmentOutcome {
            number: self.number,
            path: self.path.clone(),
            started_at,
            frames,
            dropped,
            elapsed,
            container,
        })
    }

    fn produce_frame(&self, pipeline: &FramePipeline<'_>) -> Result<Vec<u8>, DroppedFrame> {
        let mut image = pipeline
            .source
            .capture(&self.region)
            .map_err(DroppedFrame::Capture)?;

        if image.dimensions() != self.region.dimensions() {
            return Err(DroppedFrame::Dimensions {
                expected: self.region.dimensions(),
                actual: image.dimensions(),
            });
        }

        if let Some(overlay) = pipeline.overlay {
            overlay.apply(&mut image, Local::now());
        }

        let jpeg = pipeline
            .compressor
            .compress(&image, pipeline.quality)
            .map_err(DroppedFrame::Compress)?;
        if jpeg.is_empty() {
            return Err(DroppedFrame::Compress(CompressError::Empty));
        }
        Ok(jpeg)
    }

    fn log_drop(&self, dropped: u32, reason: &dyn std::fmt::Display) {
        if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
            tracing::warn!(segment = self.number, dropped, "Dropped frame: {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avi::probe;
    use crate::capture::RawImage;
    use crate::processing::timestamp::{BAR_ALPHA, MARGIN};
    use image::Rgba;
    use parking_lot::Mutex;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct StubCompressor;

    impl Compressor for StubCompressor {
        fn compress(&self, _image: &RawImage, _quality: u8) -> Result<Vec<u8>, CompressError> {
            Ok(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9])
        }
    }

    /// Returns frames of a fixed size, panicking on the given call.
    struct FixedSource {
        size: (u32, u32),
        calls: AtomicUsize,
        panic_on: Option<usize>,
        fail: bool,
    }

    impl FixedSource {
        fn new(size: (u32, u32)) -> Self {
            Self {
                size,
                calls: AtomicUsize::new(0),
                panic_on: None,
                fail: false,
            }
        }
    }

    impl FrameSource for FixedSource {
        fn capture(&self, _region: &CaptureRegion) -> Result<RawImage, CaptureError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on == Some(call) {
                panic!("capture backend crashed");
            }
            if self.fail {
                return Err(CaptureError::Backend("no display".into()));
            }
            Ok(RawImage::from_pixel(self.size.0, self.size.1, WHITE))
        }
    }

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    /// Keeps the last image it was asked to compress.
    #[derive(Default)]
    struct CapturingCompressor {
        last: Mutex<Option<RawImage>>,
    }

    impl Compressor for CapturingCompressor {
        fn compress(&self, image: &RawImage, _quality: u8) -> Result<Vec<u8>, CompressError> {
            *self.last.lock() = Some(image.clone());
            Ok(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9])
        }
    }

    fn config(dir: &std::path::Path, fps: u32, millis: u64) -> SessionConfig {
        SessionConfig::new(dir, fps, Duration::from_millis(millis))
    }

    #[test]
    fn test_segment_runs_for_its_duration() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 64, 48).unwrap();
        let source = FixedSource::new((64, 48));
        let pipeline = FramePipeline {
            source: &source,
            compressor: &StubCompressor,
            overlay: None,
            quality: 75,
        };
        let stop = StopSignal::new();
        let path = dir.path().join("seg.avi");
        let config = config(dir.path(), 20, 500);
        let mut recorder = SegmentRecorder::new(1, path.clone(), region, &config);

        let outcome = recorder.record(&pipeline, &stop).unwrap();

        assert_eq!(recorder.phase(), SegmentPhase::Done);
        assert!(outcome.elapsed >= Duration::from_millis(500));
        assert!(outcome.elapsed < Duration::from_millis(1500));
        assert!((5..=11).contains(&outcome.frames), "frames = {}", outcome.frames);
        assert_eq!(outcome.dropped, 0);

        let info = probe(&path).unwrap();
        assert_eq!(info.total_frames, outcome.frames);
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[test]
    fn test_all_captures_failing_writes_no_file() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 64, 48).unwrap();
        let mut source = FixedSource::new((64, 48));
        source.fail = true;
        let pipeline = FramePipeline {
            source: &source,
            compressor: &StubCompressor,
            overlay: None,
            quality: 75,
        };
        let path = dir.path().join("none.avi");
        let config = config(dir.path(), 10, 300);
        let mut recorder = SegmentRecorder::new(1, path.clone(), region, &config);

        let outcome = recorder.record(&pipeline, &StopSignal::new()).unwrap();

        assert_eq!(outcome.frames, 0);
        assert!(outcome.dropped >= 2);
        assert!(!outcome.has_output());
        assert!(!path.exists());
    }

    #[test]
    fn test_overlay_is_drawn_before_compression() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 160, 120).unwrap();
        let source = FixedSource::new((160, 120));
        let compressor = CapturingCompressor::default();
        let overlay = TimestampOverlay::with_font("%H:%M:%S", None, Some(16.0));
        let pipeline = FramePipeline {
            source: &source,
            compressor: &compressor,
            overlay: Some(&overlay),
            quality: 75,
        };
        let config = config(dir.path(), 10, 150);
        let mut recorder = SegmentRecorder::new(1, dir.path().join("ts.avi"), region, &config);

        let outcome = recorder.record(&pipeline, &StopSignal::new()).unwrap();
        assert!(outcome.frames > 0);

        let frame = compressor.last.lock().take().unwrap();
        let shade = (255.0 * (1.0 - BAR_ALPHA as f32 / 255.0)).round() as u8;
        let inside_bar = frame.get_pixel(160 - MARGIN - 1, 120 - MARGIN - 1);
        assert_eq!(inside_bar.0, [shade, shade, shade, 255]);
        assert_eq!(frame.get_pixel(0, 0).0, WHITE.0);
        assert_eq!(frame.get_pixel(159, 119).0, WHITE.0);
    }

    #[test]
    fn test_no_overlay_leaves_frame_untouched() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 160, 120).unwrap();
        let source = FixedSource::new((160, 120));
        let compressor = CapturingCompressor::default();
        let pipeline = FramePipeline {
            source: &source,
            compressor: &compressor,
            overlay: None,
            quality: 75,
        };
        let config = config(dir.path(), 10, 150);
        let mut recorder = SegmentRecorder::new(1, dir.path().join("plain.avi"), region, &config);

        recorder.record(&pipeline, &StopSignal::new()).unwrap();

        let frame = compressor.last.lock().take().unwrap();
        assert!(frame.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_mismatched_dimensions_are_dropped() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 64, 48).unwrap();
        let source = FixedSource::new((60, 48));
        let pipeline = FramePipeline {
            source: &source,
            compressor: &StubCompressor,
            overlay: None,
            quality: 75,
        };
        let config = config(dir.path(), 10, 250);
        let mut recorder = SegmentRecorder::new(1, dir.path().join("dim.avi"), region, &config);

        let outcome = recorder.record(&pipeline, &StopSignal::new()).unwrap();

        assert_eq!(outcome.frames, 0);
        assert!(outcome.dropped > 0);
    }

    #[test]
    fn test_stop_during_wait_ends_segment_promptly() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 32, 32).unwrap();
        let source = FixedSource::new((32, 32));
        let stop = Arc::new(StopSignal::new());
        let path = dir.path().join("stop.avi");

        let stopper = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(150));
                stop.stop();
            })
        };

        let pipeline = FramePipeline {
            source: &source,
            compressor: &StubCompressor,
            overlay: None,
            quality: 75,
        };
        // One frame per second for a minute: the only way out is the stop.
        let config = config(dir.path(), 1, 60_000);
        let mut recorder = SegmentRecorder::new(1, path.clone(), region, &config);
        let outcome = recorder.record(&pipeline, &stop).unwrap();
        stopper.join().unwrap();

        assert!(outcome.elapsed < Duration::from_secs(2));
        assert_eq!(outcome.frames, 1);
        assert!(path.exists());
    }

    #[test]
    fn test_panic_still_finalizes() {
        let dir = tempdir().unwrap();
        let region = CaptureRegion::new(0, 0, 32, 32).unwrap();
        let mut source = FixedSource::new((32, 32));
        source.panic_on = Some(4);
        let path = dir.path().join("panic.avi");
        let config = config(dir.path(), 50, 5_000);
        let mut recorder = SegmentRecorder::new(1, path.clone(), region, &config);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let pipeline = FramePipeline {
                source: &source,
                compressor: &StubCompressor,
                overlay: None,
                quality: 75,
            };
            recorder.record(&pipeline, &StopSignal::new())
        }));

        assert!(result.is_err());
        let info = probe(&path).unwrap();
        assert_eq!(info.total_frames, 3);
        assert_eq!(info.frame_chunks, 3);
    }
}
