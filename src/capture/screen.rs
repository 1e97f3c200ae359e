//! Desktop region capture using xcap
//!
//! Every call resolves the monitor under the region and grabs a fresh
//! image, so a failed capture never leaves a stale handle behind.

use super::traits::{CaptureError, CaptureRegion, FrameSource, RawImage};
use xcap::Monitor;

/// Frame source backed by the platform screen capture API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenSource;

impl ScreenSource {
    pub fn new() -> Self {
        Self
    }
}

impl FrameSource for ScreenSource {
    fn capture(&self, region: &CaptureRegion) -> Result<RawImage, CaptureError> {
        let monitor =
            Monitor::from_point(region.x(), region.y()).map_err(|_| CaptureError::NoDisplay {
                x: region.x(),
                y: region.y(),
            })?;

        let screen = monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        // Region coordinates are desktop-global; the image is monitor-local.
        let (left, top) = region
            .offset_within((monitor.x(), monitor.y()), screen.dimensions())
            .ok_or(CaptureError::OutOfBounds)?;

        let (width, height) = region.dimensions();
        Ok(image::imageops::crop_imm(&screen, left, top, width, height).to_image())
    }
}
