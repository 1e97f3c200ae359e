//! AVI (RIFF) container with a single MJPEG video stream

mod headers;
pub mod probe;
pub mod writer;

pub use probe::{probe, AviInfo, ProbeError};
pub use writer::{ContainerSummary, ContainerWriter, WriterError};
