//! Read back the headers of a written segment
//!
//! Validates the RIFF structure, reads the declared stream parameters, and
//! counts the frame chunks actually present in `movi`.

use super::headers::FRAME_CHUNK_ID;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Probe errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not a RIFF file")]
    NotRiff,

    #[error("RIFF form is not AVI")]
    NotAvi,

    #[error("Declared RIFF size {declared} does not match file size {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("Malformed AVI: {0}")]
    Malformed(String),
}

/// Stream parameters declared by an AVI file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AviInfo {
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub total_frames: u32,
    pub stream_length: u32,
    pub micro_sec_per_frame: u32,
    pub rate: u32,
    pub scale: u32,
    /// `00dc` chunks found in `movi`
    pub frame_chunks: u32,
    pub index_entries: u32,
    pub file_size: u64,
}

impl AviInfo {
    /// Declared frame rate (`dwRate / dwScale`).
    pub fn frame_rate(&self) -> f64 {
        if self.scale == 0 {
            return 0.0;
        }
        self.rate as f64 / self.scale as f64
    }

    /// Playback duration implied by the headers.
    pub fn duration_secs(&self) -> f64 {
        let rate = self.frame_rate();
        if rate <= 0.0 {
            return 0.0;
        }
        self.stream_length as f64 / rate
    }
}

/// Parse an AVI file's headers and frame chunks.
pub fn probe(path: &Path) -> Result<AviInfo, ProbeError> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut info = AviInfo {
        file_size,
        ..Default::default()
    };

    let (id, riff_size) = read_chunk_header(&mut reader)?.ok_or(ProbeError::NotRiff)?;
    if &id != b"RIFF" {
        return Err(ProbeError::NotRiff);
    }
    if riff_size as u64 + 8 != file_size {
        return Err(ProbeError::SizeMismatch {
            declared: riff_size as u64 + 8,
            actual: file_size,
        });
    }
    if &read_fourcc(&mut reader)? != b"AVI " {
        return Err(ProbeError::NotAvi);
    }

    let mut saw_hdrl = false;
    while let Some((id, size)) = read_chunk_header(&mut reader)? {
        match &id {
            b"LIST" => {
                let list_type = read_fourcc(&mut reader)?;
                let payload = size
                    .checked_sub(4)
                    .ok_or_else(|| ProbeError::Malformed("LIST shorter than its type".into()))?;
                match &list_type {
                    b"hdrl" => {
                        let mut buf = vec![0u8; payload as usize];
                        reader.read_exact(&mut buf)?;
                        parse_hdrl(&buf, &mut info)?;
                        saw_hdrl = true;
                    }
                    b"movi" => {
                        info.frame_chunks = count_frame_chunks(&mut reader, payload)?;
                    }
                    _ => skip(&mut reader, payload as u64)?,
                }
            }
            b"idx1" => {
                info.index_entries = size / 16;
                skip(&mut reader, size as u64)?;
            }
            _ => skip(&mut reader, size as u64 + (size as u64 & 1))?,
        }
    }

    if !saw_hdrl {
        return Err(ProbeError::Malformed("missing hdrl list".into()));
    }
    Ok(info)
}

fn parse_hdrl(buf: &[u8], info: &mut AviInfo) -> Result<(), ProbeError> {
    let mut cursor = Cursor::new(buf);
    while let Some((id, size)) = read_chunk_header(&mut cursor)? {
        let start = cursor.position();
        match &id {
            b"avih" => {
                info.micro_sec_per_frame = cursor.read_u32::<LittleEndian>()?;
                cursor.seek(SeekFrom::Current(12))?; // max bytes/sec, padding, flags
                info.total_frames = cursor.read_u32::<LittleEndian>()?;
                cursor.seek(SeekFrom::Current(12))?; // initial frames, streams, buffer size
                info.width = cursor.read_u32::<LittleEndian>()?;
                info.height = cursor.read_u32::<LittleEndian>()?;
            }
            b"LIST" => {
                let list_type = read_fourcc(&mut cursor)?;
                if &list_type == b"strl" {
                    // Descend: the stream headers follow directly.
                    continue;
                }
            }
            b"strh" => {
                let fcc_type = read_fourcc(&mut cursor)?;
                if &fcc_type != b"vids" {
                    return Err(ProbeError::Malformed("first stream is not video".into()));
                }
                let handler = read_fourcc(&mut cursor)?;
                info.codec = String::from_utf8_lossy(&handler).into_owned();
                cursor.seek(SeekFrom::Current(12))?; // flags, priority, language, initial frames
                info.scale = cursor.read_u32::<LittleEndian>()?;
                info.rate = cursor.read_u32::<LittleEndian>()?;
                cursor.seek(SeekFrom::Current(4))?; // start
                info.stream_length = cursor.read_u32::<LittleEndian>()?;
            }
            _ => {}
        }
        cursor.seek(SeekFrom::Start(start + size as u64 + (size as u64 & 1)))?;
    }
    Ok(())
}

fn count_frame_chunks<R: Read + Seek>(reader: &mut R, payload: u32) -> Result<u32, ProbeError> {
    let mut remaining = payload as u64;
    let mut frames = 0u32;
    while remaining >= 8 {
        let (id, size) = read_chunk_header(reader)?
            .ok_or_else(|| ProbeError::Malformed("movi list truncated".into()))?;
        let padded = size as u64 + (size as u64 & 1);
        if 8 + padded > remaining {
            return Err(ProbeError::Malformed(format!(
                "chunk of {} bytes overruns movi list",
                size
            )));
        }
        if id == FRAME_CHUNK_ID {
            frames += 1;
        }
        skip(reader, padded)?;
        remaining -= 8 + padded;
    }
    if remaining != 0 {
        return Err(ProbeError::Malformed("trailing bytes in movi list".into()));
    }
    Ok(frames)
}

fn read_fourcc<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut fourcc = [0u8; 4];
    reader.read_exact(&mut fourcc)?;
    Ok(fourcc)
}

/// Read a chunk id and size; `None` at a clean end of input.
fn read_chunk_header<R: Read>(reader: &mut R) -> io::Result<Option<([u8; 4], u32)>> {
    let mut id = [0u8; 4];
    match reader.read_exact(&mut id) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let size = reader.read_u32::<LittleEndian>()?;
    Ok(Some((id, size)))
}

fn skip<R: Seek>(reader: &mut R, bytes: u64) -> io::Result<()> {
    reader.seek(SeekFrom::Current(bytes as i64))?;
    Ok(())
}
