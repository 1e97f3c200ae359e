//! Per-frame image processing applied before compression

pub mod timestamp;

pub use timestamp::{is_valid_time_format, TimestampOverlay, DEFAULT_TIME_FORMAT};
