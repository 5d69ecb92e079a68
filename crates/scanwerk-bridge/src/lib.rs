// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-bridge — the seams between the scanning pipeline and the things
// it does not own: cameras, photo libraries and page-boundary detectors.

pub mod hough;
pub mod stub;
pub mod traits;

pub use hough::{HoughBoundaryDetector, HoughOptions};
pub use stub::{FileCaptureSource, FixedDetector, FullFrameDetector, MemoryCaptureSource, StubBridge};
pub use traits::{BoundaryDetector, CaptureSource, PlatformBridge};

/// The bridge for the current platform.
///
/// Only the desktop stub ships in this crate; mobile front ends provide
/// their own `PlatformBridge` backed by the native document detector.
pub fn platform_bridge() -> Box<dyn PlatformBridge> {
    Box::new(stub::StubBridge)
}
