//! Recording system module
//!
//! - `SegmentRecorder` captures one fixed-duration segment
//! - `RecordingController` chains segments into a session
//! - `StopSignal` is the only state the two share

pub mod coordinator;
pub mod error;
pub mod events;
pub mod naming;
pub mod segment;
pub mod signal;
pub mod state;

pub use coordinator::RecordingController;
pub use error::{RecordingError, RecordingResult};
pub use events::{EventReceiver, EventSender, RecordingEvent};
pub use naming::{sanitize_label, segment_file_name};
pub use segment::{FramePipeline, SegmentRecorder};
pub use signal::StopSignal;
pub use state::{RecordingState, SegmentOutcome, SegmentPhase, SessionConfig, SessionSummary};
