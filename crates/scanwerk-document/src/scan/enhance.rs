// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page enhancement — grayscale conversion and black-and-white thresholding
// of rectified pages before they are handed to the session.

use image::{GrayImage, Luma};
use scanwerk_core::config::PageFilter;
use scanwerk_core::error::ScanError;
use scanwerk_core::{Bitmap, PixelFormat};
use tracing::{debug, instrument};

use crate::image::ImageProcessor;

/// Applies the configured [`PageFilter`] to rectified pages.
///
/// Every filter except [`PageFilter::None`] produces a `Gray8` page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanEnhancer {
    filter: PageFilter,
}

impl ScanEnhancer {
    pub fn new(filter: PageFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> PageFilter {
        self.filter
    }

    /// Run the filter over `page`.
    #[instrument(skip_all, fields(filter = ?self.filter, w = page.width(), h = page.height()))]
    pub fn apply(&self, page: Bitmap) -> Result<Bitmap, ScanError> {
        match self.filter {
            PageFilter::None => Ok(page),
            PageFilter::Grayscale => to_gray(page),
            PageFilter::Binarize { block_radius, c } => {
                let gray = to_gray_image(page)?;
                from_gray_image(binarize(&gray, block_radius, c))
            }
            PageFilter::Otsu => {
                let gray = to_gray_image(page)?;
                let threshold = otsu_threshold(&gray);
                debug!(threshold, "Otsu threshold computed");
                from_gray_image(threshold_image(&gray, threshold))
            }
        }
    }
}

fn to_gray(page: Bitmap) -> Result<Bitmap, ScanError> {
    if page.format() == PixelFormat::Gray8 {
        return Ok(page);
    }
    ImageProcessor::from_bitmap(page)?.grayscale().into_bitmap()
}

fn to_gray_image(page: Bitmap) -> Result<GrayImage, ScanError> {
    let (w, h) = (page.width(), page.height());
    let gray = to_gray(page)?;
    GrayImage::from_raw(w, h, gray.into_bytes())
        .ok_or_else(|| ScanError::Image(format!("{w}x{h} gray buffer has the wrong length")))
}

fn from_gray_image(gray: GrayImage) -> Result<Bitmap, ScanError> {
    let (w, h) = gray.dimensions();
    Bitmap::new(w, h, PixelFormat::Gray8, gray.into_raw())
        .map_err(|err| ScanError::Image(err.to_string()))
}

/// Adaptive local-mean thresholding.
///
/// A pixel turns black when it is darker than the mean of its
/// `(2 * radius + 1)` square neighbourhood minus `c`.
pub fn binarize(gray: &GrayImage, block_radius: u32, c: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = compute_integral_image(gray);
    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let local_mean = region_mean(&integral, width, height, x, y, block_radius);
            let threshold = (local_mean as i32 - c).clamp(0, 255) as u8;
            let value = gray.get_pixel(x, y).0[0];
            output.put_pixel(x, y, Luma([if value < threshold { 0 } else { 255 }]));
        }
    }
    output
}

/// Global threshold: values below `threshold` become black.
fn threshold_image(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut output = gray.clone();
    for pixel in output.pixels_mut() {
        pixel.0[0] = if pixel.0[0] < threshold { 0 } else { 255 };
    }
    output
}

/// Summed-area table with a zero-padded first row and column; dimensions
/// `(width + 1) x (height + 1)`.
fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }
    table
}

/// Mean value of the square of `radius` around `(cx, cy)`, clipped to the
/// image.
fn region_mean(integral: &[u64], width: u32, height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let stride = (width + 1) as usize;
    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = (cx as usize + radius as usize + 1).min(width as usize);
    let y2 = (cy as usize + radius as usize + 1).min(height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;
    sum / area
}

/// Otsu's method: the threshold that maximises between-class variance.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 128;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0u64;
    let mut max_variance = 0.0;
    let mut best = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;
        let variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if variance > max_variance {
            max_variance = variance;
            // Values equal to `t` belong to the dark class.
            best = (t + 1).min(255) as u8;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half dark (40), right half light (220).
    fn two_tone(width: u32, height: u32) -> Bitmap {
        let mut pixels = Vec::new();
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 40 } else { 220 };
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        Bitmap::new(width, height, PixelFormat::Rgb8, pixels).unwrap()
    }

    #[test]
    fn none_filter_passes_page_through() {
        let page = two_tone(8, 4);
        let out = ScanEnhancer::default().apply(page.clone()).unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn grayscale_produces_gray8() {
        let out = ScanEnhancer::new(PageFilter::Grayscale)
            .apply(two_tone(8, 4))
            .unwrap();
        assert_eq!(out.format(), PixelFormat::Gray8);
        assert_eq!(out.pixel(0, 0), Some(&[40u8][..]));
        assert_eq!(out.pixel(7, 3), Some(&[220u8][..]));
    }

    #[test]
    fn otsu_splits_two_tones() {
        let out = ScanEnhancer::new(PageFilter::Otsu)
            .apply(two_tone(16, 8))
            .unwrap();
        assert_eq!(out.pixel(2, 2), Some(&[0u8][..]));
        assert_eq!(out.pixel(13, 2), Some(&[255u8][..]));
    }

    #[test]
    fn otsu_threshold_lies_between_modes() {
        let gray = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 40 } else { 220 }]));
        let t = otsu_threshold(&gray);
        assert!(t > 40 && t <= 220, "threshold {t}");
    }

    #[test]
    fn binarize_darkens_text_on_light_background() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([230u8]));
        for x in 10..30 {
            gray.put_pixel(x, 20, Luma([20u8]));
        }
        let out = binarize(&gray, 7, 10);
        assert_eq!(out.get_pixel(15, 20).0[0], 0);
        assert_eq!(out.get_pixel(15, 5).0[0], 255);
    }

    #[test]
    fn region_mean_of_uniform_image() {
        let gray = GrayImage::from_pixel(5, 5, Luma([100u8]));
        let integral = compute_integral_image(&gray);
        assert!((region_mean(&integral, 5, 5, 0, 0, 2) - 100.0).abs() < 1e-9);
        assert!((region_mean(&integral, 5, 5, 2, 2, 10) - 100.0).abs() < 1e-9);
    }
}
