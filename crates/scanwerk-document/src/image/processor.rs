// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — converting between `Bitmap` and the `image` crate's
// buffers, and JPEG encoding of pages.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, RgbImage, RgbaImage};
use scanwerk_core::error::ScanError;
use scanwerk_core::{Bitmap, PixelFormat};
use tracing::{debug, instrument};

/// Image processing wrapper operating on a single in-memory image.
///
/// Each transformation consumes `self` and returns a new processor, so calls
/// chain:
///
/// ```ignore
/// let gray = ImageProcessor::from_bitmap(page)?.grayscale().into_bitmap()?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Wrap a pixel buffer.
    pub fn from_bitmap(bitmap: Bitmap) -> Result<Self, ScanError> {
        let (w, h, format) = (bitmap.width(), bitmap.height(), bitmap.format());
        let bytes = bitmap.into_bytes();
        let image = match format {
            PixelFormat::Gray8 => GrayImage::from_raw(w, h, bytes).map(DynamicImage::ImageLuma8),
            PixelFormat::Rgb8 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
            PixelFormat::Rgba8 => RgbaImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgba8),
        }
        .ok_or_else(|| ScanError::Image(format!("{w}x{h} {format:?} buffer has the wrong length")))?;
        Ok(Self { image })
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Convert into a frame for the rectifier.
    ///
    /// 8-bit gray, RGB and RGBA images keep their layout; anything else
    /// (16-bit, float, luma+alpha) is converted to RGBA8 or RGB8.
    pub fn into_bitmap(self) -> Result<Bitmap, ScanError> {
        let (w, h) = (self.image.width(), self.image.height());
        let (format, bytes) = match self.image {
            DynamicImage::ImageLuma8(buf) => (PixelFormat::Gray8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (PixelFormat::Rgb8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
            other if other.color().has_alpha() => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
            other => (PixelFormat::Rgb8, other.to_rgb8().into_raw()),
        };
        Bitmap::new(w, h, format, bytes).map_err(|err| ScanError::Image(err.to_string()))
    }

    // -- Transformations ------------------------------------------------------

    /// Convert to 8-bit grayscale (luma).
    #[instrument(skip(self))]
    pub fn grayscale(self) -> Self {
        debug!("Converting to grayscale");
        Self {
            image: DynamicImage::ImageLuma8(self.image.to_luma8()),
        }
    }
}

/// JPEG frame headers store dimensions as 16-bit values.
pub const MAX_JPEG_SIDE: u32 = u16::MAX as u32;

/// Baseline JPEG encoding of a pixel buffer into `out`.
///
/// JPEG has no alpha channel, so RGBA input is flattened to RGB first.
/// Images wider or taller than [`MAX_JPEG_SIDE`] are refused.
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    quality: u8,
    out: &mut Vec<u8>,
) -> Result<(), image::ImageError> {
    if width > MAX_JPEG_SIDE || height > MAX_JPEG_SIDE {
        return Err(image::ImageError::Limits(image::error::LimitError::from_kind(
            image::error::LimitErrorKind::DimensionError,
        )));
    }
    let mut encoder = JpegEncoder::new_with_quality(out, quality.clamp(1, 100));
    match format {
        PixelFormat::Gray8 => encoder.encode(pixels, width, height, ExtendedColorType::L8),
        PixelFormat::Rgb8 => encoder.encode(pixels, width, height, ExtendedColorType::Rgb8),
        PixelFormat::Rgba8 => {
            encoder.encode(&strip_alpha(pixels), width, height, ExtendedColorType::Rgb8)
        }
    }
}

/// Drop the alpha channel of an RGBA buffer.
pub fn strip_alpha(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}
