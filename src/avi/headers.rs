//! RIFF/AVI header serialization
//!
//! Layout written for one MJPEG video stream:
//!
//! ```text
//! RIFF <size> 'AVI '
//!   LIST <size> 'hdrl'
//!     'avih' 56  AVIMAINHEADER
//!     LIST <size> 'strl'
//!       'strh' 56  AVISTREAMHEADER
//!       'strf' 40  BITMAPINFOHEADER
//!   LIST <size> 'movi'
//!     '00dc' <len> <jpeg> [pad]   (one per frame)
//!   'idx1' <16 * frames>
//! ```

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};
use std::time::Duration;

pub(crate) const AVIF_HASINDEX: u32 = 0x10;
pub(crate) const AVIIF_KEYFRAME: u32 = 0x10;

pub(crate) const MAIN_HEADER_LEN: u32 = 56;
pub(crate) const STREAM_HEADER_LEN: u32 = 56;
pub(crate) const BITMAP_INFO_LEN: u32 = 40;
pub(crate) const INDEX_ENTRY_LEN: u32 = 16;

pub(crate) const FRAME_CHUNK_ID: [u8; 4] = *b"00dc";
pub(crate) const CODEC_TAG: [u8; 4] = *b"MJPG";

/// Payload of the `strl` list, including its list type.
pub(crate) const STRL_PAYLOAD_LEN: u32 = 4 + (8 + STREAM_HEADER_LEN) + (8 + BITMAP_INFO_LEN);

/// Payload of the `hdrl` list, including its list type.
pub(crate) const HDRL_PAYLOAD_LEN: u32 = 4 + (8 + MAIN_HEADER_LEN) + (8 + STRL_PAYLOAD_LEN);

/// Frame rate as the `dwRate / dwScale` fraction of the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateFraction {
    pub rate: u32,
    pub scale: u32,
}

impl RateFraction {
    /// `frame_count` frames spread over `elapsed`, reduced to lowest terms.
    ///
    /// Falls back to `nominal_fps / 1` when nothing was measured. Fractions
    /// whose terms do not fit in 32 bits are scaled down together.
    pub fn measured(frame_count: u32, elapsed: Duration, nominal_fps: u32) -> Self {
        let micros = elapsed.as_micros();
        if frame_count == 0 || micros == 0 {
            return Self {
                rate: nominal_fps.max(1),
                scale: 1,
            };
        }

        let mut rate = frame_count as u128 * 1_000_000;
        let mut scale = micros;
        let divisor = gcd(rate, scale);
        rate /= divisor;
        scale /= divisor;

        let largest = rate.max(scale);
        if largest > u32::MAX as u128 {
            let shrink = largest.div_ceil(u32::MAX as u128);
            rate = (rate + shrink / 2) / shrink;
            scale = (scale + shrink / 2) / shrink;
        }

        Self {
            rate: rate.max(1) as u32,
            scale: scale.max(1) as u32,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.rate as f64 / self.scale as f64
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Everything the headers declare about the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StreamLayout {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub rate: RateFraction,
    pub max_frame_len: u32,
}

impl StreamLayout {
    pub fn frame_rate(&self) -> f64 {
        self.rate.as_f64()
    }

    pub fn micro_sec_per_frame(&self) -> u32 {
        let micros = self.rate.scale as f64 * 1_000_000.0 / self.rate.rate as f64;
        micros.round().min(u32::MAX as f64) as u32
    }

    fn max_bytes_per_sec(&self) -> u32 {
        (self.max_frame_len as f64 * self.frame_rate())
            .ceil()
            .min(u32::MAX as f64) as u32
    }
}

/// Chunk payloads are padded to an even number of bytes.
pub(crate) fn padded_len(len: u32) -> u64 {
    len as u64 + (len as u64 & 1)
}

/// Write the complete `LIST 'hdrl'` block.
pub(crate) fn write_hdrl<W: Write>(w: &mut W, layout: &StreamLayout) -> io::Result<()> {
    w.write_all(b"LIST")?;
    w.write_u32::<LittleEndian>(HDRL_PAYLOAD_LEN)?;
    w.write_all(b"hdrl")?;
    write_avih(w, layout)?;

    w.write_all(b"LIST")?;
    w.write_u32::<LittleEndian>(STRL_PAYLOAD_LEN)?;
    w.write_all(b"strl")?;
    write_strh(w, layout)?;
    write_strf(w, layout)?;
    Ok(())
}

fn write_avih<W: Write>(w: &mut W, layout: &StreamLayout) -> io::Result<()> {
    w.write_all(b"avih")?;
    w.write_u32::<LittleEndian>(MAIN_HEADER_LEN)?;
    w.write_u32::<LittleEndian>(layout.micro_sec_per_frame())?; // dwMicroSecPerFrame
    w.write_u32::<LittleEndian>(layout.max_bytes_per_sec())?; // dwMaxBytesPerSec
    w.write_u32::<LittleEndian>(0)?; // dwPaddingGranularity
    w.write_u32::<LittleEndian>(AVIF_HASINDEX)?; // dwFlags
    w.write_u32::<LittleEndian>(layout.frame_count)?; // dwTotalFrames
    w.write_u32::<LittleEndian>(0)?; // dwInitialFrames
    w.write_u32::<LittleEndian>(1)?; // dwStreams
    w.write_u32::<LittleEndian>(layout.max_frame_len)?; // dwSuggestedBufferSize
    w.write_u32::<LittleEndian>(layout.width)?;
    w.write_u32::<LittleEndian>(layout.height)?;
    for _ in 0..4 {
        w.write_u32::<LittleEndian>(0)?; // dwReserved
    }
    Ok(())
}

fn write_strh<W: Write>(w: &mut W, layout: &StreamLayout) -> io::Result<()> {
    w.write_all(b"strh")?;
    w.write_u32::<LittleEndian>(STREAM_HEADER_LEN)?;
    w.write_all(b"vids")?; // fccType
    w.write_all(&CODEC_TAG)?; // fccHandler
    w.write_u32::<LittleEndian>(0)?; // dwFlags
    w.write_u16::<LittleEndian>(0)?; // wPriority
    w.write_u16::<LittleEndian>(0)?; // wLanguage
    w.write_u32::<LittleEndian>(0)?; // dwInitialFrames
    w.write_u32::<LittleEndian>(layout.rate.scale)?; // dwScale
    w.write_u32::<LittleEndian>(layout.rate.rate)?; // dwRate
    w.write_u32::<LittleEndian>(0)?; // dwStart
    w.write_u32::<LittleEndian>(layout.frame_count)?; // dwLength
    w.write_u32::<LittleEndian>(layout.max_frame_len)?; // dwSuggestedBufferSize
    w.write_u32::<LittleEndian>(u32::MAX)?; // dwQuality (-1 = default)
    w.write_u32::<LittleEndian>(0)?; // dwSampleSize
    // rcFrame
    w.write_i16::<LittleEndian>(0)?;
    w.write_i16::<LittleEndian>(0)?;
    w.write_i16::<LittleEndian>(layout.width.min(i16::MAX as u32) as i16)?;
    w.write_i16::<LittleEndian>(layout.height.min(i16::MAX as u32) as i16)?;
    Ok(())
}

fn write_strf<W: Write>(w: &mut W, layout: &StreamLayout) -> io::Result<()> {
    w.write_all(b"strf")?;
    w.write_u32::<LittleEndian>(BITMAP_INFO_LEN)?;
    w.write_u32::<LittleEndian>(BITMAP_INFO_LEN)?; // biSize
    w.write_i32::<LittleEndian>(layout.width as i32)?; // biWidth
    w.write_i32::<LittleEndian>(layout.height as i32)?; // biHeight
    w.write_u16::<LittleEndian>(1)?; // biPlanes
    w.write_u16::<LittleEndian>(24)?; // biBitCount
    w.write_all(&CODEC_TAG)?; // biCompression
    let image_size = layout.width.saturating_mul(layout.height).saturating_mul(3);
    w.write_u32::<LittleEndian>(image_size)?; // biSizeImage
    w.write_u32::<LittleEndian>(0)?; // biXPelsPerMeter
    w.write_u32::<LittleEndian>(0)?; // biYPelsPerMeter
    w.write_u32::<LittleEndian>(0)?; // biClrUsed
    w.write_u32::<LittleEndian>(0)?; // biClrImportant
    Ok(())
}

/// Write one `00dc` frame chunk, padded to even length.
pub(crate) fn write_frame_chunk<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    w.write_all(&FRAME_CHUNK_ID)?;
    w.write_u32::<LittleEndian>(data.len() as u32)?;
    w.write_all(data)?;
    if data.len() % 2 != 0 {
        w.write_all(&[0])?;
    }
    Ok(())
}

/// Write the `idx1` block. Offsets are measured from the `movi` list type.
pub(crate) fn write_idx1<W: Write>(w: &mut W, frame_lens: &[u32]) -> io::Result<()> {
    w.write_all(b"idx1")?;
    w.write_u32::<LittleEndian>(frame_lens.len() as u32 * INDEX_ENTRY_LEN)?;

    let mut offset: u64 = 4;
    for &len in frame_lens {
        w.write_all(&FRAME_CHUNK_ID)?;
        w.write_u32::<LittleEndian>(AVIIF_KEYFRAME)?;
        w.write_u32::<LittleEndian>(offset as u32)?;
        w.write_u32::<LittleEndian>(len)?;
        offset += 8 + padded_len(len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StreamLayout {
        StreamLayout {
            width: 800,
            height: 600,
            frame_count: 20,
            rate: RateFraction {
                rate: 987,
                scale: 100,
            },
            max_frame_len: 4096,
        }
    }

    #[test]
    fn test_hdrl_length_matches_declared() {
        let mut buf = Vec::new();
        write_hdrl(&mut buf, &layout()).unwrap();
        assert_eq!(buf.len() as u32, 8 + HDRL_PAYLOAD_LEN);
        assert_eq!(&buf[..4], b"LIST");
        assert_eq!(&buf[8..12], b"hdrl");
    }

    #[test]
    fn test_fractional_rate_encoding() {
        let layout = layout();
        assert_eq!(layout.frame_rate(), 9.87);
        assert_eq!(layout.micro_sec_per_frame(), 101_317);
    }

    #[test]
    fn test_measured_rate_is_reduced() {
        let rate = RateFraction::measured(20, Duration::from_millis(2500), 10);
        assert_eq!(rate, RateFraction { rate: 8, scale: 1 });

        let rate = RateFraction::measured(36009, Duration::from_secs(3600), 10);
        assert_eq!(rate, RateFraction { rate: 4001, scale: 400 });

        let rate = RateFraction::measured(1, Duration::from_secs(3600), 10);
        assert_eq!(rate, RateFraction { rate: 1, scale: 3600 });
    }

    #[test]
    fn test_measured_rate_without_measurement_uses_nominal() {
        let expected = RateFraction { rate: 15, scale: 1 };
        assert_eq!(RateFraction::measured(0, Duration::from_secs(2), 15), expected);
        assert_eq!(RateFraction::measured(12, Duration::ZERO, 15), expected);
        assert_eq!(RateFraction::measured(12, Duration::ZERO, 0).rate, 1);
    }

    #[test]
    fn test_oversized_fraction_is_fitted_to_u32() {
        // Coprime terms far beyond 32 bits
        let elapsed = Duration::from_micros(3_600_123_457);
        let rate = RateFraction::measured(36_009, elapsed, 10);
        let implied = rate.as_f64() * elapsed.as_secs_f64();
        assert!((implied - 36_009.0).abs() < 0.01, "implied = {}", implied);
        assert!(rate.scale > 1);
    }

    #[test]
    fn test_frame_chunk_padding() {
        let mut buf = Vec::new();
        write_frame_chunk(&mut buf, &[1, 2, 3]).unwrap();
        assert_eq!(buf.len(), 8 + 4);
        assert_eq!(&buf[4..8], &3u32.to_le_bytes());
        assert_eq!(buf[11], 0);

        let mut buf = Vec::new();
        write_frame_chunk(&mut buf, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.len(), 8 + 4);
    }

    #[test]
    fn test_index_offsets_account_for_padding() {
        let mut buf = Vec::new();
        write_idx1(&mut buf, &[3, 4]).unwrap();
        assert_eq!(buf.len(), 8 + 32);
        let second_offset = u32::from_le_bytes(buf[8 + 16 + 8..8 + 16 + 12].try_into().unwrap());
        assert_eq!(second_offset, 4 + 8 + 4);
    }
}
