//! Capture trait definitions
//!
//! Platform-agnostic types for the frame source and the single-frame
//! compressor the segment recorder drives.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw frame as delivered by a frame source: RGBA8, top-left origin.
pub type RawImage = image::RgbaImage;

/// Smallest selection (in logical pixels) the region picker may accept.
pub const MIN_SELECTION_SIZE: u32 = 10;

/// Region validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("Region must have a non-zero size (got {width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("Selection {width}x{height} is smaller than the {min}x{min} minimum")]
    TooSmall { width: f64, height: f64, min: u32 },

    #[error("Invalid display scale factor: {0}")]
    InvalidScale(f64),
}

/// Frame capture errors. Always transient from the recorder's point of view.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No display contains the point ({x}, {y})")]
    NoDisplay { x: i32, y: i32 },

    #[error("Region lies outside the captured display")]
    OutOfBounds,

    #[error("Capture backend failed: {0}")]
    Backend(String),
}

/// Single-frame compression errors
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Encoder produced no data")]
    Empty,
}

/// Plain rectangle used for (de)serialization; validated into a
/// [`CaptureRegion`] on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Immutable capture rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegionBounds", into = "RegionBounds")]
pub struct CaptureRegion {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl CaptureRegion {
    /// Create a region from physical pixel coordinates.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Result<Self, RegionError> {
        if width == 0 || height == 0 {
            return Err(RegionError::Empty { width, height });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Accept a user selection made in logical (DPI-scaled) coordinates.
    ///
    /// The minimum size check applies to the logical selection; the stored
    /// region is converted to physical pixels so that its dimensions match
    /// the frames the capture primitive returns.
    pub fn from_selection(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        scale_factor: f64,
    ) -> Result<Self, RegionError> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(RegionError::InvalidScale(scale_factor));
        }
        let min = MIN_SELECTION_SIZE as f64;
        if !(width >= min && height >= min) {
            return Err(RegionError::TooSmall {
                width,
                height,
                min: MIN_SELECTION_SIZE,
            });
        }

        Self::new(
            (x * scale_factor).round() as i32,
            (y * scale_factor).round() as i32,
            (width * scale_factor).round() as u32,
            (height * scale_factor).round() as u32,
        )
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Top-left corner of this region inside an image of `size` whose
    /// top-left sits at `origin` on the desktop. `None` unless the region
    /// lies entirely inside it.
    pub fn offset_within(&self, origin: (i32, i32), size: (u32, u32)) -> Option<(u32, u32)> {
        let left = u32::try_from(self.x.checked_sub(origin.0)?).ok()?;
        let top = u32::try_from(self.y.checked_sub(origin.1)?).ok()?;
        let right = left.checked_add(self.width)?;
        let bottom = top.checked_add(self.height)?;
        (right <= size.0 && bottom <= size.1).then_some((left, top))
    }
}

impl TryFrom<RegionBounds> for CaptureRegion {
    type Error = RegionError;

    fn try_from(bounds: RegionBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.x, bounds.y, bounds.width, bounds.height)
    }
}

impl From<CaptureRegion> for RegionBounds {
    fn from(region: CaptureRegion) -> Self {
        Self {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        }
    }
}

/// Produces one raw image of the requested region per call.
///
/// Implementations must not keep a capture handle alive between calls.
pub trait FrameSource: Send + Sync {
    fn capture(&self, region: &CaptureRegion) -> Result<RawImage, CaptureError>;
}

/// Compresses a raw frame into a standalone JPEG image.
pub trait Compressor: Send + Sync {
    fn compress(&self, image: &RawImage, quality: u8) -> Result<Vec<u8>, CompressError>;
}
