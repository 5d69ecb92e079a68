// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Desktop/CI implementations of the bridge traits.
//
// There is no camera here: frames come from image files on disk (the
// gallery-import path) or from an in-memory queue, and boundaries come
// from fixed corners or the whole frame.

use std::collections::VecDeque;
use std::path::PathBuf;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{Bitmap, PixelFormat, Quadrilateral, RawFrame};
use tracing::{debug, info};

use crate::traits::*;

/// Bridge returned on platforms without a native page detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

/// Without a page detector every frame is taken as a full-frame page.
impl BoundaryDetector for StubBridge {
    fn detect_boundary(&self, frame: &RawFrame) -> Result<Option<Quadrilateral>> {
        FullFrameDetector::default().detect_boundary(frame)
    }
}

// -- Detectors ----------------------------------------------------------------

/// Always answers with the same corners, or with "no page".
#[derive(Debug, Clone, Copy)]
pub struct FixedDetector {
    quad: Option<Quadrilateral>,
}

impl FixedDetector {
    pub fn new(quad: Quadrilateral) -> Self {
        Self { quad: Some(quad) }
    }

    /// A detector that never finds a page.
    pub fn none() -> Self {
        Self { quad: None }
    }
}

impl BoundaryDetector for FixedDetector {
    fn detect_boundary(&self, _frame: &RawFrame) -> Result<Option<Quadrilateral>> {
        Ok(self.quad)
    }
}

/// Treats the whole frame, inset by `margin` pixels on each side, as the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFrameDetector {
    margin: f64,
}

impl FullFrameDetector {
    pub fn with_margin(margin: f64) -> Self {
        Self {
            margin: margin.max(0.0),
        }
    }
}

impl BoundaryDetector for FullFrameDetector {
    fn detect_boundary(&self, frame: &RawFrame) -> Result<Option<Quadrilateral>> {
        let w = frame.width() as f64 - 2.0 * self.margin;
        let h = frame.height() as f64 - 2.0 * self.margin;
        if w <= 0.0 || h <= 0.0 {
            return Ok(None);
        }
        Ok(Some(Quadrilateral::from_rect(self.margin, self.margin, w, h)))
    }
}

// -- Capture sources ----------------------------------------------------------

/// Reads frames from image files in order (gallery import).
#[derive(Debug)]
pub struct FileCaptureSource {
    paths: VecDeque<PathBuf>,
}

impl FileCaptureSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl CaptureSource for FileCaptureSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let frame = load_frame(&path)?;
        info!(
            path = %path.display(),
            width = frame.width(),
            height = frame.height(),
            "Frame imported"
        );
        Ok(Some(frame))
    }
}

/// Decode an image file into a frame. 16-bit and float images are reduced
/// to 8 bits per channel.
pub fn load_frame(path: &std::path::Path) -> Result<RawFrame> {
    let img = image::open(path).map_err(|err| {
        ScanError::Image(format!("failed to open {}: {}", path.display(), err))
    })?;
    let (w, h) = (img.width(), img.height());
    let (format, bytes) = match img {
        image::DynamicImage::ImageLuma8(buf) => (PixelFormat::Gray8, buf.into_raw()),
        image::DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
        other => (PixelFormat::Rgb8, other.to_rgb8().into_raw()),
    };
    Bitmap::new(w, h, format, bytes).map_err(|err| ScanError::Image(err.to_string()))
}

/// Hands out frames pushed into it, in order.
#[derive(Debug, Default)]
pub struct MemoryCaptureSource {
    frames: VecDeque<RawFrame>,
}

impl MemoryCaptureSource {
    pub fn new(frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, frame: RawFrame) {
        self.frames.push_back(frame);
    }
}

impl CaptureSource for MemoryCaptureSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let frame = self.frames.pop_front();
        debug!(remaining = self.frames.len(), "Frame dequeued");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32) -> RawFrame {
        Bitmap::filled(w, h, PixelFormat::Gray8, &[128]).unwrap()
    }

    #[test]
    fn stub_bridge_takes_the_whole_frame() {
        let bridge = crate::platform_bridge();
        assert_eq!(bridge.platform_name(), "Desktop (stub)");
        let quad = bridge.detect_boundary(&frame(30, 20)).unwrap();
        assert_eq!(quad, Some(Quadrilateral::from_rect(0.0, 0.0, 30.0, 20.0)));
    }

    #[test]
    fn full_frame_detector_insets_by_margin() {
        let quad = FullFrameDetector::with_margin(10.0)
            .detect_boundary(&frame(100, 60))
            .unwrap()
            .unwrap();
        assert_eq!(quad, Quadrilateral::from_rect(10.0, 10.0, 80.0, 40.0));
    }

    #[test]
    fn full_frame_detector_margin_too_large() {
        let result = FullFrameDetector::with_margin(40.0)
            .detect_boundary(&frame(100, 60))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn fixed_detector_none() {
        assert!(FixedDetector::none().detect_boundary(&frame(4, 4)).unwrap().is_none());
    }

    #[test]
    fn memory_source_preserves_order() {
        let mut source = MemoryCaptureSource::new([frame(1, 1), frame(2, 2)]);
        source.push(frame(3, 3));
        let widths: Vec<u32> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| f.width())
            .collect();
        assert_eq!(widths, vec![1, 2, 3]);
    }

    #[test]
    fn file_source_reports_missing_file() {
        let mut source = FileCaptureSource::new([PathBuf::from("/nonexistent/page-1.jpg")]);
        assert!(matches!(source.next_frame(), Err(ScanError::Image(_))));
        assert_eq!(source.remaining(), 0);
        assert!(source.next_frame().unwrap().is_none());
    }
}
