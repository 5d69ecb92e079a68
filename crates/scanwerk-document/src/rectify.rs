// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rectifier — inverse-mapped bilinear resampling of a captured frame
// through a perspective transform.

use rayon::prelude::*;
use scanwerk_core::config::RectifyLimits;
use scanwerk_core::error::RectifyError;
use scanwerk_core::{Bitmap, Point, RawFrame};
use tracing::{debug, instrument};

use crate::geometry::PerspectiveTransform;

/// Resamples captured frames into flat, top-down page bitmaps.
///
/// Each call reads only its own frame and transform and writes a fresh
/// buffer, so a single rectifier can be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRectifier {
    limits: RectifyLimits,
}

impl PageRectifier {
    pub fn new(limits: RectifyLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RectifyLimits {
        &self.limits
    }

    /// Rectify `frame` through `transform`.
    ///
    /// For every destination pixel the source position is found through the
    /// inverse transform and sampled bilinearly. Source positions outside the
    /// frame are clamped to the nearest edge pixel. The output keeps the
    /// frame's pixel format and is byte-identical for identical inputs.
    #[instrument(skip_all, fields(
        src_w = frame.width(),
        src_h = frame.height(),
        dst_w = transform.width(),
        dst_h = transform.height()
    ))]
    pub fn rectify(
        &self,
        frame: &RawFrame,
        transform: &PerspectiveTransform,
    ) -> Result<Bitmap, RectifyError> {
        let (out_w, out_h) = (transform.width(), transform.height());
        if out_w == 0 || out_h == 0 {
            return Err(RectifyError::InvalidInput(format!(
                "transform targets an empty {out_w}x{out_h} page"
            )));
        }

        let requested = out_w as u64 * out_h as u64;
        if requested > self.limits.max_output_pixels {
            return Err(RectifyError::OutOfMemory {
                requested,
                limit: self.limits.max_output_pixels,
            });
        }

        let channels = frame.format().channels();
        let stride = out_w as usize * channels;
        let mut pixels = vec![0u8; stride * out_h as usize];

        pixels
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..out_w as usize {
                    let src = transform.apply_inverse(Point::new(x as f64, y as f64));
                    sample_bilinear(frame, src, &mut row[x * channels..(x + 1) * channels]);
                }
            });

        debug!(pixels = requested, "Page rectified");
        Bitmap::new(out_w, out_h, frame.format(), pixels)
    }
}

/// Bilinearly sample `frame` at `pos`, clamping to the frame edges, and
/// write one pixel into `out`.
fn sample_bilinear(frame: &RawFrame, pos: Point, out: &mut [u8]) {
    let max_x = (frame.width() - 1) as f64;
    let max_y = (frame.height() - 1) as f64;

    // A point at infinity lands on the origin rather than propagating NaN.
    let sx = if pos.x.is_nan() { 0.0 } else { pos.x.clamp(0.0, max_x) };
    let sy = if pos.y.is_nan() { 0.0 } else { pos.y.clamp(0.0, max_y) };

    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;

    let x0 = x0 as u32;
    let y0 = y0 as u32;
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);

    let bytes = frame.as_bytes();
    let channels = frame.format().channels();
    let stride = frame.stride();
    let at = |x: u32, y: u32| y as usize * stride + x as usize * channels;
    let (i00, i10, i01, i11) = (at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1));

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    for (c, slot) in out.iter_mut().enumerate() {
        let v = bytes[i00 + c] as f64 * w00
            + bytes[i10 + c] as f64 * w10
            + bytes[i01 + c] as f64 * w01
            + bytes[i11 + c] as f64 * w11;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
}
