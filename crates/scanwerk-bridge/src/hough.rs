// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Classical page-boundary detection: blur, Canny edges, Hough lines, then
// the outermost horizontal and vertical lines are intersected into corners.
//
// Used where no vendor detector exists (desktop import). It finds pages that
// contrast with their background and are roughly axis-aligned.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{PixelFormat, Point, Quadrilateral, RawFrame};
use tracing::{debug, instrument, warn};

use crate::traits::BoundaryDetector;

/// Tuning knobs for [`HoughBoundaryDetector`].
#[derive(Debug, Clone, Copy)]
pub struct HoughOptions {
    /// Frames are downscaled so the longer side is at most this many pixels
    /// before edge detection.
    pub working_size: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum votes as a fraction of the working image diagonal.
    pub vote_fraction: f64,
    pub suppression_radius: u32,
    /// Smallest accepted page, as a fraction of the frame area.
    pub min_area_fraction: f64,
}

impl Default for HoughOptions {
    fn default() -> Self {
        Self {
            working_size: 1024,
            blur_sigma: 2.0,
            canny_low: 50.0,
            canny_high: 150.0,
            vote_fraction: 0.25,
            suppression_radius: 8,
            min_area_fraction: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HoughBoundaryDetector {
    options: HoughOptions,
}

impl HoughBoundaryDetector {
    pub fn new(options: HoughOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HoughOptions {
        &self.options
    }
}

impl BoundaryDetector for HoughBoundaryDetector {
    #[instrument(skip_all, fields(w = frame.width(), h = frame.height()))]
    fn detect_boundary(&self, frame: &RawFrame) -> Result<Option<Quadrilateral>> {
        let opts = &self.options;
        let gray = to_gray(frame)?;

        let (orig_w, orig_h) = gray.dimensions();
        let longest = orig_w.max(orig_h);
        let scale = if longest > opts.working_size {
            opts.working_size as f64 / longest as f64
        } else {
            1.0
        };
        let gray = if scale < 1.0 {
            let w = ((orig_w as f64 * scale).round() as u32).max(1);
            let h = ((orig_h as f64 * scale).round() as u32).max(1);
            imageops::resize(&gray, w, h, FilterType::Triangle)
        } else {
            gray
        };
        let (work_w, work_h) = gray.dimensions();

        let blurred = gaussian_blur_f32(&gray, opts.blur_sigma);
        let edges = canny(&blurred, opts.canny_low, opts.canny_high);

        let diagonal = (work_w as f64).hypot(work_h as f64);
        let vote_threshold = (diagonal * opts.vote_fraction).max(40.0) as u32;
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold,
                suppression_radius: opts.suppression_radius,
            },
        );
        debug!(line_count = lines.len(), vote_threshold, "Hough lines detected");

        let (horizontal, vertical) = classify_lines(&lines);
        if horizontal.len() < 2 || vertical.len() < 2 {
            debug!(
                horizontal = horizontal.len(),
                vertical = vertical.len(),
                "Not enough page edges"
            );
            return Ok(None);
        }

        let (cx, cy) = (work_w as f64 / 2.0, work_h as f64 / 2.0);
        let by_y = |l: &&PolarLine| y_at(l, cx);
        let by_x = |l: &&PolarLine| x_at(l, cy);
        let (Some(top), Some(bottom)) = (min_by(&horizontal, by_y), max_by(&horizontal, by_y)) else {
            return Ok(None);
        };
        let (Some(left), Some(right)) = (min_by(&vertical, by_x), max_by(&vertical, by_x)) else {
            return Ok(None);
        };

        let corners = [
            intersect_polar_lines(top, left),
            intersect_polar_lines(top, right),
            intersect_polar_lines(bottom, right),
            intersect_polar_lines(bottom, left),
        ];
        let [Some(tl), Some(tr), Some(br), Some(bl)] = corners else {
            warn!("Page edges do not intersect");
            return Ok(None);
        };

        // Back to source pixels, clamped to the frame.
        let restore = |(x, y): (f64, f64)| {
            Point::new(
                (x / scale).clamp(0.0, orig_w as f64),
                (y / scale).clamp(0.0, orig_h as f64),
            )
        };
        let quad = Quadrilateral::new(restore(tl), restore(tr), restore(br), restore(bl));

        let min_area = orig_w as f64 * orig_h as f64 * opts.min_area_fraction;
        if quad.signed_area() < min_area {
            warn!(area = quad.signed_area(), min_area, "Detected outline too small");
            return Ok(None);
        }

        debug!(?quad, "Page boundary detected");
        Ok(Some(quad))
    }
}

fn to_gray(frame: &RawFrame) -> Result<GrayImage> {
    let (w, h) = (frame.width(), frame.height());
    let bytes = frame.as_bytes().to_vec();
    let image = match frame.format() {
        PixelFormat::Gray8 => return GrayImage::from_raw(w, h, bytes).ok_or_else(|| bad_buffer(frame)),
        PixelFormat::Rgb8 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
        PixelFormat::Rgba8 => RgbaImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgba8),
    };
    image.map(|img| img.to_luma8()).ok_or_else(|| bad_buffer(frame))
}

fn bad_buffer(frame: &RawFrame) -> ScanError {
    ScanError::Image(format!(
        "{}x{} {:?} frame has the wrong buffer length",
        frame.width(),
        frame.height(),
        frame.format()
    ))
}

/// Split lines into page-edge candidates.
///
/// A `PolarLine` satisfies `x cos(θ) + y sin(θ) = r`, so θ near 90° is a
/// horizontal line and θ near 0° or 180° a vertical one. Diagonals in
/// between are discarded.
fn classify_lines(lines: &[PolarLine]) -> (Vec<PolarLine>, Vec<PolarLine>) {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for line in lines {
        let angle = line.angle_in_degrees;
        if (60..=120).contains(&angle) {
            horizontal.push(*line);
        } else if angle <= 30 || angle >= 150 {
            vertical.push(*line);
        }
    }
    (horizontal, vertical)
}

/// `y` where a near-horizontal line crosses `x`.
fn y_at(line: &PolarLine, x: f64) -> f64 {
    let theta = (line.angle_in_degrees as f64).to_radians();
    (line.r as f64 - x * theta.cos()) / theta.sin()
}

/// `x` where a near-vertical line crosses `y`.
fn x_at(line: &PolarLine, y: f64) -> f64 {
    let theta = (line.angle_in_degrees as f64).to_radians();
    (line.r as f64 - y * theta.sin()) / theta.cos()
}

fn min_by<'a>(lines: &'a [PolarLine], key: impl Fn(&&PolarLine) -> f64) -> Option<&'a PolarLine> {
    lines.iter().min_by(|a, b| key(a).total_cmp(&key(b)))
}

fn max_by<'a>(lines: &'a [PolarLine], key: impl Fn(&&PolarLine) -> f64) -> Option<&'a PolarLine> {
    lines.iter().max_by(|a, b| key(a).total_cmp(&key(b)))
}

/// Intersection of two polar lines, `None` when (nearly) parallel.
fn intersect_polar_lines(a: &PolarLine, b: &PolarLine) -> Option<(f64, f64)> {
    let theta_a = (a.angle_in_degrees as f64).to_radians();
    let theta_b = (b.angle_in_degrees as f64).to_radians();
    let (sin_a, cos_a) = theta_a.sin_cos();
    let (sin_b, cos_b) = theta_b.sin_cos();

    let denom = cos_a * sin_b - sin_a * cos_b;
    if denom.abs() < 1e-6 {
        return None;
    }

    let (r_a, r_b) = (a.r as f64, b.r as f64);
    let x = (r_a * sin_b - r_b * sin_a) / denom;
    let y = (r_b * cos_a - r_a * cos_b) / denom;
    Some((x, y))
}
