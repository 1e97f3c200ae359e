//! Timestamp label burned into the bottom-right corner of each frame

use crate::capture::RawImage;
use crate::config::OverlaySettings;
use ab_glyph::{FontArc, PxScale};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use image::Rgba;
use imageproc::drawing::{draw_text_mut, text_size};
use std::fmt::Write;
use std::path::Path;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Alpha of the black bar behind the label
pub(crate) const BAR_ALPHA: u8 = 160;
/// Gap between the bar and the frame edges
pub(crate) const MARGIN: u32 = 8;
const PADDING: u32 = 6;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
];

/// Whether `format` is a strftime pattern chrono can render.
pub fn is_valid_time_format(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

pub struct TimestampOverlay {
    format: String,
    font: Option<FontArc>,
    font_size: Option<f32>,
}

impl TimestampOverlay {
    /// Build an overlay from settings, loading the configured font or the
    /// first available system font.
    pub fn new(settings: &OverlaySettings) -> Self {
        let font = match &settings.font_path {
            Some(path) => load_font(path).or_else(find_system_font),
            None => find_system_font(),
        };
        if font.is_none() {
            tracing::warn!("No usable font found, timestamp overlay will draw the bar only");
        }
        Self::with_font(&settings.time_format, font, settings.font_size)
    }

    pub fn with_font(format: &str, font: Option<FontArc>, font_size: Option<f32>) -> Self {
        let format = if is_valid_time_format(format) {
            format.to_string()
        } else {
            tracing::warn!(
                "Invalid time format {:?}, using {:?}",
                format,
                DEFAULT_TIME_FORMAT
            );
            DEFAULT_TIME_FORMAT.to_string()
        };
        Self {
            format,
            font,
            font_size,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn label_for(&self, time: DateTime<Local>) -> String {
        let mut label = String::new();
        if write!(label, "{}", time.format(&self.format)).is_err() {
            // Default format always renders
            return time.format(DEFAULT_TIME_FORMAT).to_string();
        }
        label
    }

    /// Draw the label for `time` onto `frame` in place.
    pub fn apply(&self, frame: &mut RawImage, time: DateTime<Local>) {
        let label = self.label_for(time);
        let (width, height) = frame.dimensions();
        let size = self
            .font_size
            .unwrap_or_else(|| (height as f32 / 36.0).clamp(12.0, 48.0));
        let scale = PxScale::from(size);

        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, &label),
            None => (
                (label.chars().count() as f32 * size * 0.55).ceil() as u32,
                size.ceil() as u32,
            ),
        };

        let bar_w = (text_w + 2 * PADDING).min(width.saturating_sub(MARGIN));
        let bar_h = (text_h + 2 * PADDING).min(height.saturating_sub(MARGIN));
        if bar_w == 0 || bar_h == 0 {
            return;
        }
        let bar_x = width.saturating_sub(MARGIN + bar_w);
        let bar_y = height.saturating_sub(MARGIN + bar_h);

        darken_rect(frame, bar_x, bar_y, bar_w, bar_h);

        if let Some(font) = &self.font {
            draw_text_mut(
                frame,
                TEXT_COLOR,
                (bar_x + PADDING) as i32,
                (bar_y + PADDING) as i32,
                scale,
                font,
                &label,
            );
        }
    }
}

/// Blend a black rectangle with [`BAR_ALPHA`] over the frame.
fn darken_rect(frame: &mut RawImage, x: u32, y: u32, w: u32, h: u32) {
    let alpha = BAR_ALPHA as f32 / 255.0;
    let x_end = (x + w).min(frame.width());
    let y_end = (y + h).min(frame.height());
    for py in y..y_end {
        for px in x..x_end {
            let pixel = frame.get_pixel_mut(px, py);
            for channel in pixel.0.iter_mut().take(3) {
                *channel = (*channel as f32 * (1.0 - alpha)).round() as u8;
            }
        }
    }
}

fn load_font(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    match FontArc::try_from_vec(data) {
        Ok(font) => {
            tracing::debug!("Loaded overlay font from {:?}", path);
            Some(font)
        }
        Err(e) => {
            tracing::warn!("Font {:?} could not be parsed: {}", path, e);
            None
        }
    }
}

fn find_system_font() -> Option<FontArc> {
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(|candidate| Path::new(*candidate))
        .filter(|p| p.exists())
        .find_map(load_font)
}
