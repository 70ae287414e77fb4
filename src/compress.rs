//! Frame re-encoding under a size ceiling
//!
//! The detector rejects large images, so each frame is downscaled and
//! re-encoded as JPEG. The first pass uses generous settings; only when that
//! overshoots the ceiling do progressively smaller passes follow.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

use crate::constants::MAX_FRAME_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to read frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame still {size} bytes at minimum settings (limit {limit})")]
    CeilingUnreachable { size: usize, limit: usize },
}

#[derive(Debug, Clone)]
pub struct CompressionPolicy {
    pub max_bytes: usize,
    pub initial_width: u32,
    pub initial_quality: u8,
    pub fallback_width: u32,
    pub fallback_quality: u8,
    /// Width multiplier applied on every pass after the fallback
    pub width_step: f32,
    pub quality_step: u8,
    pub min_width: u32,
    pub min_quality: u8,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_FRAME_BYTES,
            initial_width: 1920,
            initial_quality: 85,
            fallback_width: 1280,
            fallback_quality: 70,
            width_step: 0.75,
            quality_step: 10,
            min_width: 320,
            min_quality: 30,
        }
    }
}

#[derive(Debug)]
pub struct CompressedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub quality: u8,
    /// Number of encode passes it took to get under the ceiling
    pub passes: u32,
}

/// Re-encode `data` so the result is at most `policy.max_bytes`.
pub fn compress_frame(
    data: &[u8],
    policy: &CompressionPolicy,
) -> Result<CompressedFrame, CompressError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;

    let mut width = policy.initial_width;
    let mut quality = policy.initial_quality;
    let mut passes = 1;
    let mut bytes = encode_jpeg(&img, width, quality)?;

    if bytes.len() <= policy.max_bytes {
        return Ok(CompressedFrame {
            bytes,
            width: width.min(img.width()),
            quality,
            passes,
        });
    }

    // Widths past the source are no-ops, so step down from the real width
    width = policy
        .fallback_width
        .min(img.width())
        .max(policy.min_width);
    quality = policy.fallback_quality.max(policy.min_quality);

    loop {
        passes += 1;
        bytes = encode_jpeg(&img, width, quality)?;
        tracing::debug!(pass = passes, width, quality, size = bytes.len(), "re-encoded frame");

        if bytes.len() <= policy.max_bytes {
            return Ok(CompressedFrame {
                bytes,
                width: width.min(img.width()),
                quality,
                passes,
            });
        }

        if width <= policy.min_width && quality <= policy.min_quality {
            return Err(CompressError::CeilingUnreachable {
                size: bytes.len(),
                limit: policy.max_bytes,
            });
        }

        width = ((width as f32 * policy.width_step) as u32).max(policy.min_width);
        quality = quality
            .saturating_sub(policy.quality_step)
            .max(policy.min_quality);
    }
}

/// Downscale to at most `max_width` (aspect preserved) and encode as JPEG.
fn encode_jpeg(img: &DynamicImage, max_width: u32, quality: u8) -> Result<Vec<u8>, CompressError> {
    let rgb = if img.width() > max_width {
        img.resize(max_width, img.height(), FilterType::Triangle)
            .to_rgb8()
    } else {
        img.to_rgb8()
    };

    let mut output = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut output, quality).encode_image(&rgb)?;
    Ok(output.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};

    fn png_bytes(width: u32, height: u32, noisy: bool) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            if noisy {
                // Cheap deterministic noise that JPEG compresses poorly
                let v = x.wrapping_mul(2_654_435_761).wrapping_add(y.wrapping_mul(40_503)) ^ (x * y);
                Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
            } else {
                Rgb([(x % 256) as u8, (y % 256) as u8, 128])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_small_frame_single_pass() {
        let data = png_bytes(640, 480, false);
        let frame = compress_frame(&data, &CompressionPolicy::default()).unwrap();

        assert_eq!(frame.passes, 1);
        assert_eq!(frame.quality, 85);
        assert_eq!(frame.width, 640);
        assert!(frame.bytes.len() <= MAX_FRAME_BYTES);
    }

    #[test]
    fn test_wide_frame_is_downscaled() {
        let data = png_bytes(2400, 600, false);
        let frame = compress_frame(&data, &CompressionPolicy::default()).unwrap();

        let decoded = image::load_from_memory(&frame.bytes).unwrap();
        assert_eq!(decoded.width(), 1920);
        assert_eq!(decoded.height(), 480);
    }

    #[test]
    fn test_oversized_frame_takes_more_passes_and_fits() {
        let data = png_bytes(1600, 1200, true);
        let policy = CompressionPolicy {
            max_bytes: 60 * 1024,
            min_width: 64,
            min_quality: 10,
            ..CompressionPolicy::default()
        };

        let frame = compress_frame(&data, &policy).unwrap();
        assert!(frame.passes > 1);
        assert!(frame.bytes.len() <= policy.max_bytes);
        assert!(frame.width < 1600);
    }

    #[test]
    fn test_unreachable_ceiling_is_an_error() {
        let data = png_bytes(400, 300, true);
        let policy = CompressionPolicy {
            max_bytes: 10,
            ..CompressionPolicy::default()
        };

        let err = compress_frame(&data, &policy).unwrap_err();
        assert!(matches!(err, CompressError::CeilingUnreachable { limit: 10, .. }));
    }

    #[test]
    fn test_narrow_tall_frame_steps_down_to_width_floor() {
        let data = png_bytes(400, 3000, true);
        let img = image::load_from_memory(&data).unwrap();
        let floor_size = encode_jpeg(&img, 320, 30).unwrap().len();
        let policy = CompressionPolicy {
            max_bytes: floor_size,
            ..CompressionPolicy::default()
        };

        let frame = compress_frame(&data, &policy).unwrap();
        assert!(frame.bytes.len() <= floor_size);
        assert_eq!(frame.width, 320);
        assert!(frame.passes > 2);
    }

    #[test]
    fn test_garbage_input_fails_to_decode() {
        let err = compress_frame(b"definitely not an image", &CompressionPolicy::default());
        assert!(err.is_err());
    }
}
