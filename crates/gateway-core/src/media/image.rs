//! Image reformatting and resizing for the image-generation response path,
//! which must honor a requested output format and size regardless of what
//! the underlying provider actually returned.

use image::{ImageFormat, ImageReader};
use std::io::Cursor;

use super::error::MediaError;

pub fn parse_output_format(name: &str) -> Result<ImageFormat, MediaError> {
    match name.to_ascii_lowercase().as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
        "webp" => Ok(ImageFormat::WebP),
        "gif" => Ok(ImageFormat::Gif),
        _ => Err(MediaError::UnsupportedImageFormat),
    }
}

/// Re-encodes `bytes` as `format`, optionally resizing to `(width, height)`
/// first. The gateway uses this to normalize provider output to the
/// format/size the caller requested.
pub fn reformat(bytes: &[u8], format: ImageFormat, size: Option<(u32, u32)>) -> Result<Vec<u8>, MediaError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MediaError::ImageDecode(e.to_string()))?;
    let mut image = reader.decode().map_err(|e| MediaError::ImageDecode(e.to_string()))?;

    if let Some((width, height)) = size {
        image = image.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
    }

    let mut output = Cursor::new(Vec::new());
    image
        .write_to(&mut output, format)
        .map_err(|e| MediaError::ImageDecode(e.to_string()))?;
    Ok(output.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png() -> Vec<u8> {
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn parses_known_formats() {
        assert!(matches!(parse_output_format("PNG"), Ok(ImageFormat::Png)));
        assert!(matches!(parse_output_format("jpg"), Ok(ImageFormat::Jpeg)));
        assert!(parse_output_format("tiff").is_err());
    }

    #[test]
    fn reformat_round_trips_png_to_jpeg() {
        let png = sample_png();
        let jpeg = reformat(&png, ImageFormat::Jpeg, None).unwrap();
        assert!(!jpeg.is_empty());
        assert_ne!(jpeg, png);
    }

    #[test]
    fn reformat_resizes_when_requested() {
        let png = sample_png();
        let resized = reformat(&png, ImageFormat::Png, Some((8, 8))).unwrap();
        let decoded = image::load_from_memory(&resized).unwrap();
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 8);
    }
}
