//! Thumbnail generation using the image crate.
//!
//! Generates thumbnails at approximately 256px height while preserving aspect ratio,
//! encoded as JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use crate::error::GalleryResult;
use crate::image_loader;

/// Default target height for thumbnails in pixels.
pub const DEFAULT_THUMB_HEIGHT: u32 = 256;

/// Minimum width for thumbnails (to handle extreme aspect ratios).
const MIN_THUMB_WIDTH: u32 = 64;

/// Maximum width for thumbnails (to handle extreme panoramas).
const MAX_THUMB_WIDTH: u32 = 1024;

/// JPEG quality for thumbnail encoding (0-100).
const JPEG_QUALITY: u8 = 85;

/// An encoded upload: source dimensions plus the JPEG thumbnail.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub source_width: u32,
    pub source_height: u32,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailGenerator {
    target_height: u32,
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_THUMB_HEIGHT)
    }
}

impl ThumbnailGenerator {
    pub fn new(target_height: u32) -> Self {
        Self {
            target_height: target_height.max(1),
        }
    }

    /// Decodes uploaded bytes and produces a JPEG thumbnail.
    ///
    /// CPU bound; callers on the async runtime should run it via `spawn_blocking`.
    pub fn generate(&self, bytes: &[u8]) -> GalleryResult<Thumbnail> {
        let img = image_loader::decode_image(bytes)?;
        let (source_width, source_height) = img.dimensions();

        let (width, height) =
            Self::calculate_dimensions(source_width, source_height, self.target_height);
        debug!(
            source_width,
            source_height, width, height, "Calculated thumbnail dimensions"
        );

        let thumbnail = img.resize_exact(width, height, FilterType::CatmullRom);
        let jpeg = Self::encode_jpeg(&thumbnail)?;

        Ok(Thumbnail {
            source_width,
            source_height,
            jpeg,
            width,
            height,
        })
    }

    /// Calculate thumbnail dimensions preserving aspect ratio.
    ///
    /// The target height is used as the base, with width calculated proportionally.
    /// Width is clamped to MIN_THUMB_WIDTH..MAX_THUMB_WIDTH to handle extreme aspect ratios.
    fn calculate_dimensions(src_width: u32, src_height: u32, target_height: u32) -> (u32, u32) {
        if src_height == 0 || src_width == 0 {
            return (target_height, target_height);
        }

        // Never upscale
        let effective_height = target_height.min(src_height);

        let aspect_ratio = src_width as f64 / src_height as f64;
        let calculated_width = (effective_height as f64 * aspect_ratio).round() as u32;
        let final_width = calculated_width.clamp(MIN_THUMB_WIDTH, MAX_THUMB_WIDTH);

        let final_height = if final_width != calculated_width {
            (final_width as f64 / aspect_ratio).round() as u32
        } else {
            effective_height
        };

        (final_width.max(1), final_height.max(1))
    }

    fn encode_jpeg(img: &DynamicImage) -> GalleryResult<Vec<u8>> {
        // JPEG has no alpha channel
        let rgb_img = img.to_rgb8();
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
        rgb_img.write_with_encoder(encoder)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::tests::png_bytes;
    use image::ImageFormat;

    #[test]
    fn test_calculate_dimensions_normal() {
        // 1920x1080 -> target 256 height
        let (w, h) = ThumbnailGenerator::calculate_dimensions(1920, 1080, 256);
        assert_eq!(h, 256);
        assert!((w as i32 - 455).abs() <= 1);
    }

    #[test]
    fn test_calculate_dimensions_small_source() {
        let (w, h) = ThumbnailGenerator::calculate_dimensions(200, 100, 256);
        assert_eq!(h, 100);
        assert_eq!(w, 200);
    }

    #[test]
    fn test_calculate_dimensions_extreme_panorama() {
        let (w, h) = ThumbnailGenerator::calculate_dimensions(10000, 500, 256);
        assert_eq!(w, MAX_THUMB_WIDTH);
        assert!(h < 256);
    }

    #[test]
    fn test_calculate_dimensions_extreme_portrait() {
        let (w, _) = ThumbnailGenerator::calculate_dimensions(100, 5000, 256);
        assert_eq!(w, MIN_THUMB_WIDTH);
    }

    #[test]
    fn test_generate_from_png() {
        let thumb = ThumbnailGenerator::default()
            .generate(&png_bytes(600, 400))
            .unwrap();
        assert_eq!((thumb.source_width, thumb.source_height), (600, 400));
        assert_eq!((thumb.width, thumb.height), (384, 256));
        assert_eq!(
            image::guess_format(&thumb.jpeg).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_generate_rejects_garbage() {
        assert!(ThumbnailGenerator::default()
            .generate(b"not an image")
            .is_err());
    }
}
