use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat};

use crate::error::{GalleryError, GalleryResult};

/// Sniffs the container format of uploaded bytes, rejecting anything unsupported.
pub fn detect_format(bytes: &[u8]) -> GalleryResult<ImageFormat> {
    let format = image::guess_format(bytes)
        .map_err(|_| GalleryError::Validation("unrecognised image format".to_string()))?;
    match format {
        ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::WebP
        | ImageFormat::Gif
        | ImageFormat::Bmp
        | ImageFormat::Tiff => Ok(format),
        other => Err(GalleryError::Validation(format!(
            "unsupported image format {other:?}"
        ))),
    }
}

/// File extension used for stored originals.
pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        _ => "jpg",
    }
}

/// Decodes an image; animated GIFs yield their first frame.
pub fn decode_image(bytes: &[u8]) -> GalleryResult<DynamicImage> {
    let format = detect_format(bytes)?;

    if format == ImageFormat::Gif {
        let decoder = GifDecoder::new(Cursor::new(bytes))?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(GalleryError::Validation("GIF has no frames".to_string()));
    }

    Ok(image::load_from_memory_with_format(bytes, format)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgb, RgbImage, Rgba, RgbaImage};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            for shade in [10u8, 250] {
                let frame = RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255]));
                encoder.encode_frame(Frame::new(frame)).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(&png_bytes(4, 3)).unwrap(), ImageFormat::Png);
        assert!(matches!(
            detect_format(b"definitely not an image").unwrap_err(),
            GalleryError::Validation(_)
        ));
    }

    #[test]
    fn test_gif_first_frame() {
        let img = decode_image(&gif_bytes(8, 6)).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));
        let px = img.to_rgba8().get_pixel(0, 0).0;
        assert!(px[0] < 128, "expected the dark first frame, got {px:?}");
    }

    #[test]
    fn test_truncated_image_fails() {
        let bytes = png_bytes(16, 16);
        assert!(decode_image(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(ImageFormat::Jpeg), "jpg");
        assert_eq!(extension_for(ImageFormat::Png), "png");
    }
}
