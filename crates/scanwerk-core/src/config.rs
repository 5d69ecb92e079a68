// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning configuration.

use serde::{Deserialize, Serialize};

use crate::PaperSize;

/// Thresholds applied when validating a quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryLimits {
    /// Every edge must be strictly longer than this, in pixels.
    pub min_edge_px: f64,
    /// Largest acceptable condition number of the homography system.
    pub max_condition_number: f64,
}

impl Default for GeometryLimits {
    fn default() -> Self {
        Self {
            min_edge_px: 8.0,
            max_condition_number: 1e12,
        }
    }
}

/// Resource limits for the page rectifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyLimits {
    /// Largest rectified page, in pixels (width * height).
    pub max_output_pixels: u64,
}

impl Default for RectifyLimits {
    fn default() -> Self {
        Self {
            max_output_pixels: 40_000_000,
        }
    }
}

/// Post-rectification clean-up applied to each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFilter {
    /// Keep the rectified colour page.
    #[default]
    None,
    /// Convert to 8-bit grayscale.
    Grayscale,
    /// Adaptive local-mean thresholding to black and white.
    Binarize { block_radius: u32, c: i32 },
    /// Global Otsu thresholding to black and white.
    Otsu,
}

/// Lowest resolution accepted for native page sizing.
pub const MIN_DPI: f64 = 1.0;
/// Highest resolution accepted for native page sizing.
pub const MAX_DPI: f64 = 2400.0;

/// How each page is sized in the output PDF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PageLayout {
    /// Page matches the image at the given resolution, clamped to
    /// [`MIN_DPI`]..=[`MAX_DPI`].
    Native { dpi: f64 },
    /// Fixed paper size; image scaled to fit inside the margins.
    Paper(PaperSize),
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::Native { dpi: 150.0 }
    }
}

/// Persistent scanning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub geometry: GeometryLimits,
    pub rectify: RectifyLimits,
    pub filter: PageFilter,
    /// JPEG quality (1-100) for page images embedded in the PDF.
    pub jpeg_quality: u8,
    pub layout: PageLayout,
    /// Maximum pages per session; 0 means unlimited.
    pub max_pages: usize,
    /// Title written to the PDF information dictionary.
    pub title: Option<String>,
    /// Rectify batched captures on the rayon pool.
    pub parallel_rectification: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryLimits::default(),
            rectify: RectifyLimits::default(),
            filter: PageFilter::None,
            jpeg_quality: 85,
            layout: PageLayout::default(),
            max_pages: 0,
            title: None,
            parallel_rectification: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{ "jpeg_quality": 70, "max_pages": 5 }"#).unwrap();
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.geometry, GeometryLimits::default());
        assert_eq!(config.layout, PageLayout::Native { dpi: 150.0 });
    }

    #[test]
    fn round_trips_through_json() {
        let config = ScanConfig {
            filter: PageFilter::Binarize {
                block_radius: 15,
                c: 10,
            },
            layout: PageLayout::Paper(PaperSize::Letter),
            title: Some("Receipts".into()),
            ..ScanConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ScanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
