//! screenwatch - continuous segmented screen-region recording.
//!
//! Captures a fixed desktop rectangle at a target frame rate into
//! back-to-back MJPEG AVI segments and hands each finished segment to
//! downstream processing.

pub mod avi;
pub mod capture;
pub mod commands;
pub mod config;
pub mod downstream;
pub mod processing;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenwatch_lib=debug,screenwatch=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
