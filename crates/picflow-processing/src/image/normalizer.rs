//! Image normalization
//!
//! Decodes an upload, corrects its orientation, re-encodes the corrected original and
//! derives a bounded JPEG thumbnail. All functions here are CPU-bound and synchronous.

use super::orientation::ImageOrientation;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use picflow_core::constants::{NORMALIZED_JPEG_QUALITY, THUMBNAIL_JPEG_QUALITY, THUMBNAIL_MAX_EDGE};
use picflow_core::Resolution;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Encoding of the stored original.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Result of a successful normalization.
#[derive(Debug)]
pub struct NormalizedImage {
    pub original: Vec<u8>,
    pub format: OutputFormat,
    pub thumbnail: Vec<u8>,
    /// Dimensions after orientation correction.
    pub resolution: Resolution,
}

/// Decode, correct orientation, and re-encode `data`.
///
/// PNG sources stay PNG so transparency survives; everything else becomes a
/// high-quality JPEG. The thumbnail is always JPEG.
pub fn normalize(data: &[u8], orientation: u8) -> Result<NormalizedImage, NormalizeError> {
    let source_format = image::guess_format(data).ok();
    let img = image::load_from_memory(data).map_err(NormalizeError::Decode)?;
    let img = ImageOrientation::apply(img, orientation);

    let (width, height) = img.dimensions();

    let format = match source_format {
        Some(ImageFormat::Png) => OutputFormat::Png,
        _ => OutputFormat::Jpeg,
    };
    let original = match format {
        OutputFormat::Png => encode_png(&img)?,
        OutputFormat::Jpeg => encode_jpeg(&img, NORMALIZED_JPEG_QUALITY)?,
    };

    let thumbnail = encode_jpeg(
        &bounded(&img, THUMBNAIL_MAX_EDGE),
        THUMBNAIL_JPEG_QUALITY,
    )?;

    Ok(NormalizedImage {
        original,
        format,
        thumbnail,
        resolution: Resolution::new(width, height),
    })
}

/// Decode `data` and re-encode it as JPEG with the longest edge at most `max_edge`.
pub fn encode_bounded_jpeg(data: &[u8], max_edge: u32, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    let img = image::load_from_memory(data).map_err(NormalizeError::Decode)?;
    encode_jpeg(&bounded(&img, max_edge), quality)
}

/// Shrink to fit within `max_edge` × `max_edge`, preserving aspect ratio. Never enlarges.
fn bounded(img: &DynamicImage, max_edge: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_edge && height <= max_edge {
        return img.clone();
    }
    img.thumbnail(max_edge, max_edge)
}

/// JPEG has no alpha channel; anything other than 8-bit RGB or grey is converted to RGB.
fn jpeg_compatible(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img.clone(),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, NormalizeError> {
    let mut out = Vec::new();
    jpeg_compatible(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(NormalizeError::Encode)?;
    Ok(out)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, NormalizeError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(NormalizeError::Encode)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{jpeg_bytes, png_bytes};

    fn dims(data: &[u8]) -> (u32, u32) {
        image::load_from_memory(data).unwrap().dimensions()
    }

    #[test]
    fn test_thumbnail_is_bounded() {
        let normalized = normalize(&jpeg_bytes(1200, 800), 1).unwrap();
        assert_eq!(normalized.resolution, Resolution::new(1200, 800));
        let (w, h) = dims(&normalized.thumbnail);
        assert_eq!(w, 400);
        assert!((266..=267).contains(&h));
        assert_eq!(dims(&normalized.original), (1200, 800));
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let normalized = normalize(&jpeg_bytes(120, 90), 1).unwrap();
        assert_eq!(dims(&normalized.thumbnail), (120, 90));
    }

    #[test]
    fn test_orientation_applied_before_measuring() {
        let normalized = normalize(&jpeg_bytes(600, 300), 6).unwrap();
        assert_eq!(normalized.resolution, Resolution::new(300, 600));
        assert_eq!(dims(&normalized.original), (300, 600));
        assert_eq!(dims(&normalized.thumbnail), (200, 400));
    }

    #[test]
    fn test_png_stays_png_and_thumbnail_is_jpeg() {
        let normalized = normalize(&png_bytes(500, 500), 1).unwrap();
        assert_eq!(normalized.format, OutputFormat::Png);
        assert_eq!(
            image::guess_format(&normalized.original).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            image::guess_format(&normalized.thumbnail).unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(dims(&normalized.thumbnail), (400, 400));
    }

    #[test]
    fn test_undecodable_bytes_fail() {
        let result = normalize(b"not an image at all", 1);
        assert!(matches!(result, Err(NormalizeError::Decode(_))));
    }

    #[test]
    fn test_encode_bounded_jpeg() {
        let out = encode_bounded_jpeg(&png_bytes(2048, 1024), 1024, 85).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        assert_eq!(dims(&out), (1024, 512));
    }
}
