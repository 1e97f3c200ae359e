//! JPEG single-frame compression

use super::traits::{Compressor, CompressError, RawImage};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Default JPEG quality for recorded frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Baseline JPEG encoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCompressor;

impl Compressor for JpegCompressor {
    fn compress(&self, image: &RawImage, quality: u8) -> Result<Vec<u8>, CompressError> {
        let (width, height) = image.dimensions();

        // JPEG has no alpha channel; drop it without an intermediate image.
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        rgb.extend(image.as_raw().chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]));

        let mut jpeg = Vec::with_capacity(rgb.len() / 10);
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
        encoder.encode(&rgb, width, height, ExtendedColorType::Rgb8)?;

        if jpeg.is_empty() {
            return Err(CompressError::Empty);
        }
        Ok(jpeg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_compress_produces_decodable_jpeg() {
        let image = RawImage::from_fn(64, 48, |x, y| Rgba([(x * 4) as u8, (y * 5) as u8, 90, 255]));

        let jpeg = JpegCompressor.compress(&image, DEFAULT_JPEG_QUALITY).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_quality_affects_size() {
        let image = RawImage::from_fn(128, 128, |x, y| {
            Rgba([((x * y) % 251) as u8, ((x + y) % 253) as u8, (x % 7 * 30) as u8, 255])
        });

        let low = JpegCompressor.compress(&image, 10).unwrap();
        let high = JpegCompressor.compress(&image, 95).unwrap();
        assert!(low.len() < high.len());
    }
}
