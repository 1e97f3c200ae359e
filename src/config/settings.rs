//! Persisted recorder settings
//!
//! Stored as camelCase JSON in the platform config directory:
//! - Linux: `~/.config/screenwatch/settings.json`
//! - macOS: `~/Library/Application Support/screenwatch/settings.json`
//! - Windows: `%APPDATA%\screenwatch\settings.json`

use crate::capture::{RegionBounds, DEFAULT_JPEG_QUALITY};
use crate::processing::{is_valid_time_format, DEFAULT_TIME_FORMAT};
use crate::recorder::SessionConfig;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;

/// Settings errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("Could not determine {0} directory")]
    NoDirectory(&'static str),
}

/// Timestamp overlay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlaySettings {
    pub enabled: bool,
    /// chrono strftime pattern
    pub time_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
    /// Pixel height of the label; scaled to the frame when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            font_path: None,
            font_size: None,
        }
    }
}

/// Post-segment conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversionSettings {
    pub enabled: bool,
    pub ffmpeg_path: PathBuf,
    /// Remove the AVI once the MP4 has been written
    pub delete_source: bool,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            delete_source: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    /// Segment directory. Falls back to the user's Videos folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub label: String,
    pub fps: u32,
    pub segment_minutes: f64,
    pub jpeg_quality: u8,
    pub file_extension: String,
    pub overlay: OverlaySettings,
    pub conversion: ConversionSettings,
    /// Region selected in the previous session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_region: Option<RegionBounds>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            label: "recording".to_string(),
            fps: 10,
            segment_minutes: 5.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            file_extension: "avi".to_string(),
            overlay: OverlaySettings::default(),
            conversion: ConversionSettings::default(),
            last_region: None,
        }
    }
}

impl RecorderSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Load from `path`, using defaults if it is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No settings file at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings from {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }

    /// Write pretty JSON, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dirs = ProjectDirs::from("", "", "screenwatch")
            .ok_or(SettingsError::NoDirectory("config"))?;
        Ok(dirs.config_dir().join("settings.json"))
    }

    /// `<Videos>/screenwatch`, or `<home>/screenwatch` without a Videos folder.
    pub fn default_output_dir() -> Result<PathBuf, SettingsError> {
        let dirs = UserDirs::new().ok_or(SettingsError::NoDirectory("home"))?;
        let base = dirs
            .video_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.home_dir().to_path_buf());
        Ok(base.join("screenwatch"))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(SettingsError::Invalid(format!(
                "fps must be between {} and {}, got {}",
                MIN_FPS, MAX_FPS, self.fps
            )));
        }
        self.segment_duration()?;
        if self.jpeg_quality > 100 {
            return Err(SettingsError::Invalid(format!(
                "JPEG quality must be at most 100, got {}",
                self.jpeg_quality
            )));
        }
        let plain_extension = !self.file_extension.is_empty()
            && self.file_extension.chars().all(|c| c.is_ascii_alphanumeric());
        if !plain_extension {
            return Err(SettingsError::Invalid(format!(
                "file extension {:?} is not a plain extension",
                self.file_extension
            )));
        }
        if self.overlay.enabled && !is_valid_time_format(&self.overlay.time_format) {
            return Err(SettingsError::Invalid(format!(
                "time format {:?} is not a valid strftime pattern",
                self.overlay.time_format
            )));
        }
        if let Some(size) = self.overlay.font_size {
            if !(size.is_finite() && size > 0.0) {
                return Err(SettingsError::Invalid(format!(
                    "font size {} is not positive",
                    size
                )));
            }
        }
        Ok(())
    }

    /// Segment length, rejecting values that are not positive or overflow.
    pub fn segment_duration(&self) -> Result<Duration, SettingsError> {
        let invalid = || {
            SettingsError::Invalid(format!(
                "segment length must be a positive number of minutes, got {}",
                self.segment_minutes
            ))
        };
        if !(self.segment_minutes.is_finite() && self.segment_minutes > 0.0) {
            return Err(invalid());
        }
        let duration =
            Duration::try_from_secs_f64(self.segment_minutes * 60.0).map_err(|_| invalid())?;
        if duration.is_zero() {
            return Err(invalid());
        }
        Ok(duration)
    }

    pub fn output_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.output_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.clone()),
            _ => Self::default_output_dir(),
        }
    }

    /// Validated runtime view of these settings.
    pub fn session_config(&self) -> Result<SessionConfig, SettingsError> {
        self.validate()?;
        Ok(SessionConfig {
            output_dir: self.output_dir()?,
            fps: self.fps,
            segment_duration: self.segment_duration()?,
            jpeg_quality: self.jpeg_quality,
            file_extension: self.file_extension.clone(),
            overlay: self.overlay.enabled.then(|| self.overlay.clone()),
        })
    }
}
