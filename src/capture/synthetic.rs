//! Synthetic test-pattern source for headless runs

use super::traits::{CaptureError, CaptureRegion, FrameSource, RawImage};
use image::Rgba;
use std::time::Instant;

/// Produces a diagonal gradient that scrolls over time, so consecutive
/// frames differ and playback is visibly moving.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    epoch: Instant,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SyntheticSource {
    fn capture(&self, region: &CaptureRegion) -> Result<RawImage, CaptureError> {
        let shift = (self.epoch.elapsed().as_millis() / 10) as u32;
        Ok(RawImage::from_fn(region.width(), region.height(), |x, y| {
            Rgba([
                (x.wrapping_add(shift) % 256) as u8,
                (y.wrapping_add(shift / 2) % 256) as u8,
                ((x + y) / 4 % 256) as u8,
                255,
            ])
        }))
    }
}
