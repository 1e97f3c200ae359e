//! Frame acquisition
//!
//! The frame source contract, the JPEG compressor, and the concrete
//! sources: the desktop (behind the `screen` feature) and a synthetic
//! test pattern.

pub mod compress;
pub mod synthetic;
pub mod traits;

#[cfg(feature = "screen")]
pub mod screen;

pub use compress::{JpegCompressor, DEFAULT_JPEG_QUALITY};
pub use synthetic::SyntheticSource;
pub use traits::{
    CaptureError, CaptureRegion, CompressError, Compressor, FrameSource, RawImage, RegionBounds,
    RegionError, MIN_SELECTION_SIZE,
};

#[cfg(feature = "screen")]
pub use screen::ScreenSource;
