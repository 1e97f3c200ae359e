//! Operations behind the command-line subcommands
//!
//! These wrap the library modules and report failures as [`AppError`] so the
//! CLI can render them uniformly.

use crate::avi::{self, AviInfo};
use crate::capture::{CaptureRegion, RegionBounds};
use crate::config::RecorderSettings;
use crate::utils::{AppError, AppResult};
use std::path::Path;

/// Read back the headers of a recorded segment.
pub fn probe_segment(path: &Path) -> AppResult<AviInfo> {
    tracing::debug!("Probing {:?}", path);
    Ok(avi::probe(path)?)
}

/// Write default settings to `path`, refusing to replace an existing file
/// unless `force` is set.
pub fn init_config(path: &Path, force: bool) -> AppResult<()> {
    if path.exists() && !force {
        return Err(AppError::InvalidInput(format!(
            "{:?} already exists (use --force to overwrite)",
            path
        )));
    }
    RecorderSettings::default().save(path)?;
    Ok(())
}

/// Turn a logical selection into the capture region, remembering it in
/// `settings`. Without a selection the last remembered region is reused.
pub fn resolve_region(
    settings: &mut RecorderSettings,
    selection: Option<[f64; 4]>,
    scale_factor: f64,
) -> AppResult<CaptureRegion> {
    match selection {
        Some([x, y, width, height]) => {
            let region = CaptureRegion::from_selection(x, y, width, height, scale_factor)?;
            settings.last_region = Some(RegionBounds::from(region));
            Ok(region)
        }
        None => {
            let bounds = settings.last_region.ok_or_else(|| {
                AppError::InvalidInput(
                    "No region given and no previous region in settings".to_string(),
                )
            })?;
            Ok(CaptureRegion::try_from(bounds)?)
        }
    }
}
