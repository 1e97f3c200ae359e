//! Recorder configuration

pub mod settings;

pub use settings::{
    ConversionSettings, OverlaySettings, RecorderSettings, SettingsError, MAX_FPS, MIN_FPS,
};
