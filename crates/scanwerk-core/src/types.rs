// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk capture pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RectifyError;

/// Unique identifier for a scanning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Geometry primitives ------------------------------------------------------

/// A point in source-image pixel coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A detected document boundary: four corners ordered clockwise starting at
/// the top-left corner.
///
/// Construction does not validate the shape. Convexity, orientation and edge
/// length are checked by the geometry engine when a transform is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    /// `[top_left, top_right, bottom_right, bottom_left]`.
    pub corners: [Point; 4],
}

impl Quadrilateral {
    pub fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self {
            corners: [top_left, top_right, bottom_right, bottom_left],
        }
    }

    /// Build from `(x, y)` tuples in clockwise order from the top-left.
    pub fn from_tuples(corners: [(f64, f64); 4]) -> Self {
        Self {
            corners: corners.map(Point::from),
        }
    }

    /// The axis-aligned rectangle `(x, y)`..`(x + width, y + height)`.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_tuples([
            (x, y),
            (x + width, y),
            (x + width, y + height),
            (x, y + height),
        ])
    }

    pub fn top_left(&self) -> Point {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.corners[3]
    }

    /// Edge lengths as `[top, right, bottom, left]`.
    pub fn edge_lengths(&self) -> [f64; 4] {
        let c = &self.corners;
        [
            c[0].distance(&c[1]),
            c[1].distance(&c[2]),
            c[2].distance(&c[3]),
            c[3].distance(&c[0]),
        ]
    }

    /// Signed shoelace area. Positive for clockwise order in image
    /// coordinates (y pointing down).
    pub fn signed_area(&self) -> f64 {
        let c = &self.corners;
        let mut twice = 0.0;
        for i in 0..4 {
            let j = (i + 1) % 4;
            twice += c[i].x * c[j].y - c[j].x * c[i].y;
        }
        twice / 2.0
    }

    /// Unsigned area in square pixels.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }
}

// -- Pixel buffers ------------------------------------------------------------

/// Channel layout of an 8-bit pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub const fn channels(&self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// An owned, tightly packed 8-bit pixel buffer.
///
/// Rows are stored top to bottom with no padding, so the buffer length is
/// always `width * height * format.channels()`.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

/// A captured camera or gallery frame, handed to the rectifier read-only.
pub type RawFrame = Bitmap;

impl Bitmap {
    /// Wrap an existing pixel buffer, checking that its length matches the
    /// declared dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, RectifyError> {
        if width == 0 || height == 0 {
            return Err(RectifyError::InvalidInput(format!(
                "bitmap dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * format.channels();
        if pixels.len() != expected {
            return Err(RectifyError::InvalidInput(format!(
                "pixel buffer holds {} bytes, {width}x{height} {format:?} needs {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// A bitmap filled with a single pixel value. `pixel` must have
    /// `format.channels()` bytes.
    pub fn filled(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel: &[u8],
    ) -> Result<Self, RectifyError> {
        if pixel.len() != format.channels() {
            return Err(RectifyError::InvalidInput(format!(
                "fill pixel has {} channels, {format:?} needs {}",
                pixel.len(),
                format.channels()
            )));
        }
        let count = width as usize * height as usize;
        let pixels = pixel.repeat(count);
        Self::new(width, height, format, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Number of pixels (`width * height`).
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.channels()
    }

    /// The channel bytes of the pixel at `(x, y)`, or `None` when outside
    /// the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let ch = self.format.channels();
        let start = y as usize * self.stride() + x as usize * ch;
        Some(&self.pixels[start..start + ch])
    }

    /// Bytes of row `y`.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.stride();
        let start = y as usize * stride;
        Some(&self.pixels[start..start + stride])
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// -- Session model ------------------------------------------------------------

/// Lifecycle of a capture slot.
///
/// A session only ever holds `Rectified` pages. `Pending` and `Failed`
/// describe captures that have not become pages, for callers tracking a
/// batch slot by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    /// Frame received, rectification not yet complete.
    Pending,
    /// Rectified bitmap stored in the session.
    Rectified,
    /// Rectification failed and nothing was stored.
    Failed,
}

/// Lifecycle states of a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Accepting captures and edits.
    Open,
    /// Pages are being handed to the PDF assembler.
    Finalizing,
    /// Pages transferred; no further mutation.
    Closed,
    /// Abandoned by the user; all pages released.
    Discarded,
}

/// Read-only description of one stored page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub status: PageStatus,
    pub source_quad: Quadrilateral,
}

/// A consistent copy of a session's state for observers (UI preview, CLI
/// progress output). Never aliases live session data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    /// Incremented on every mutation; equal versions imply equal contents.
    pub version: u64,
    pub pages: Vec<PageSummary>,
    pub created_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Standard paper sizes for fixed-size PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// Dimensions in PDF points (1/72 inch).
    pub fn dimensions_pt(&self) -> (f64, f64) {
        let (w, h) = self.dimensions_mm();
        (mm_to_pt(w as f64), mm_to_pt(h as f64))
    }

    /// Parse a paper name such as `a4` or `letter`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "a3" => Some(Self::A3),
            "a5" => Some(Self::A5),
            "letter" => Some(Self::Letter),
            "legal" => Some(Self::Legal),
            _ => None,
        }
    }
}

/// Convert millimetres to PDF points.
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * 72.0 / 25.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_rejects_wrong_length() {
        let err = Bitmap::new(4, 4, PixelFormat::Rgb8, vec![0; 47]).unwrap_err();
        assert!(matches!(err, RectifyError::InvalidInput(_)));
    }

    #[test]
    fn bitmap_rejects_zero_dimensions() {
        assert!(Bitmap::new(0, 4, PixelFormat::Gray8, Vec::new()).is_err());
    }

    #[test]
    fn bitmap_pixel_access() {
        let mut pixels = vec![0u8; 3 * 2 * 3];
        // (2, 1) in a 3x2 RGB image
        let start = (3 + 2) * 3;
        pixels[start..start + 3].copy_from_slice(&[10, 20, 30]);
        let bmp = Bitmap::new(3, 2, PixelFormat::Rgb8, pixels).unwrap();
        assert_eq!(bmp.pixel(2, 1), Some(&[10u8, 20, 30][..]));
        assert_eq!(bmp.pixel(3, 0), None);
        assert_eq!(bmp.stride(), 9);
    }

    #[test]
    fn quad_edges_and_area() {
        let quad = Quadrilateral::from_rect(0.0, 0.0, 100.0, 140.0);
        assert_eq!(quad.edge_lengths(), [100.0, 140.0, 100.0, 140.0]);
        assert!((quad.signed_area() - 14_000.0).abs() < 1e-9);
    }

    #[test]
    fn counter_clockwise_area_is_negative() {
        let quad = Quadrilateral::from_tuples([(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]);
        assert!(quad.signed_area() < 0.0);
        assert!((quad.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn paper_size_points() {
        let (w, h) = PaperSize::A4.dimensions_pt();
        assert!((w - 595.28).abs() < 0.01);
        assert!((h - 841.89).abs() < 0.01);
        assert_eq!(PaperSize::from_name("Letter"), Some(PaperSize::Letter));
        assert_eq!(PaperSize::from_name("b5"), None);
    }
}
