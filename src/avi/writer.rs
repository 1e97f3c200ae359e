//! In-memory MJPEG segment writer
//!
//! Frames are buffered until [`ContainerWriter::finalize`], which knows the
//! real frame count and elapsed time and can therefore write every header
//! field correctly in a single forward pass, with no seek-back fixups.

use super::headers::{
    padded_len, write_frame_chunk, write_hdrl, write_idx1, RateFraction, StreamLayout,
    HDRL_PAYLOAD_LEN, INDEX_ENTRY_LEN,
};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Container writer errors
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writer is already finalized")]
    Closed,

    #[error("Refusing to append an empty frame")]
    EmptyFrame,

    #[error("Segment of {0} bytes exceeds the 4 GiB RIFF limit")]
    TooLarge(u64),
}

/// What a successful finalize wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    /// Effective rate declared in the headers
    pub frame_rate: f64,
    pub file_size: u64,
}

#[derive(Debug)]
enum WriterState {
    Open,
    Finalized(Option<ContainerSummary>),
}

/// Buffers compressed frames for one segment and serializes them on finalize.
#[derive(Debug)]
pub struct ContainerWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    nominal_fps: u32,
    frames: Vec<Vec<u8>>,
    state: WriterState,
}

impl ContainerWriter {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, nominal_fps: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            nominal_fps: nominal_fps.max(1),
            frames: Vec::new(),
            state: WriterState::Open,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, WriterState::Finalized(_))
    }

    /// Take ownership of one JPEG frame. Returns its ordinal index.
    pub fn add_frame(&mut self, jpeg: Vec<u8>) -> Result<usize, WriterError> {
        if self.is_finalized() {
            return Err(WriterError::Closed);
        }
        if jpeg.is_empty() {
            return Err(WriterError::EmptyFrame);
        }
        self.frames.push(jpeg);
        Ok(self.frames.len() - 1)
    }

    /// Serialize all buffered frames to disk.
    ///
    /// Returns `Ok(None)` when there was nothing to write. Calling this again
    /// returns the first call's outcome without touching the file.
    pub fn finalize(
        &mut self,
        actual_duration: Duration,
    ) -> Result<Option<ContainerSummary>, WriterError> {
        if let WriterState::Finalized(summary) = &self.state {
            tracing::debug!("Writer for {:?} already finalized", self.path);
            return Ok(summary.clone());
        }

        let frames = std::mem::take(&mut self.frames);
        self.state = WriterState::Finalized(None);

        if frames.is_empty() {
            tracing::info!("Segment {:?} captured no frames, nothing written", self.path);
            return Ok(None);
        }

        let frame_count = frames.len() as u32;
        let rate = RateFraction::measured(frame_count, actual_duration, self.nominal_fps);
        let frame_rate = rate.as_f64();
        let layout = StreamLayout {
            width: self.width,
            height: self.height,
            frame_count,
            rate,
            max_frame_len: frames.iter().map(|f| f.len() as u32).max().unwrap_or(0),
        };

        let file_size = match write_container(&self.path, &layout, &frames) {
            Ok(size) => size,
            Err(e) => {
                // The handle is already closed; don't leave a truncated file behind.
                if let Err(remove_err) = std::fs::remove_file(&self.path) {
                    tracing::debug!(
                        "Could not remove partial segment {:?}: {}",
                        self.path,
                        remove_err
                    );
                }
                return Err(e);
            }
        };

        let summary = ContainerSummary {
            path: self.path.clone(),
            width: self.width,
            height: self.height,
            frame_count: layout.frame_count,
            frame_rate,
            file_size,
        };

        tracing::info!(
            "Segment finalized: {} frames @ {:.3}fps over {:.2}s -> {:?} ({} bytes)",
            summary.frame_count,
            frame_rate,
            actual_duration.as_secs_f64(),
            self.path,
            file_size
        );

        self.state = WriterState::Finalized(Some(summary.clone()));
        Ok(Some(summary))
    }
}

/// Write the whole file in one pass. The handle lives only inside this call.
fn write_container(
    path: &Path,
    layout: &StreamLayout,
    frames: &[Vec<u8>],
) -> Result<u64, WriterError> {
    let frame_lens: Vec<u32> = frames.iter().map(|f| f.len() as u32).collect();

    let movi_payload: u64 = 4 + frame_lens.iter().map(|&len| 8 + padded_len(len)).sum::<u64>();
    let idx_len = frame_lens.len() as u64 * INDEX_ENTRY_LEN as u64;
    let riff_payload = 4 + (8 + HDRL_PAYLOAD_LEN as u64) + (8 + movi_payload) + (8 + idx_len);
    if riff_payload > u32::MAX as u64 || frames.iter().any(|f| f.len() > u32::MAX as usize) {
        return Err(WriterError::TooLarge(riff_payload + 8));
    }

    let mut out = BufWriter::new(File::create(path)?);

    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(riff_payload as u32)?;
    out.write_all(b"AVI ")?;

    write_hdrl(&mut out, layout)?;

    out.write_all(b"LIST")?;
    out.write_u32::<LittleEndian>(movi_payload as u32)?;
    out.write_all(b"movi")?;
    for frame in frames {
        write_frame_chunk(&mut out, frame)?;
    }

    write_idx1(&mut out, &frame_lens)?;

    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(riff_payload + 8)
}
