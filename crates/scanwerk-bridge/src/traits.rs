// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the collaborators the scanning
// pipeline depends on but does not own: frame sources and the page-boundary
// detector.

use scanwerk_core::error::Result;
use scanwerk_core::{Quadrilateral, RawFrame};

/// Finds the page outline in a captured frame.
///
/// On phones this is the vendor document-detection service; on desktop it
/// is one of the classical implementations in this crate.
pub trait BoundaryDetector: Send + Sync {
    /// Return the page corners clockwise from top-left in source pixels,
    /// or `Ok(None)` when no page is visible.
    fn detect_boundary(&self, frame: &RawFrame) -> Result<Option<Quadrilateral>>;
}

/// A stream of captured frames (camera shutter presses or gallery picks).
///
/// Having been granted camera or storage permission is a precondition of
/// constructing an implementation.
pub trait CaptureSource {
    /// The next frame, or `Ok(None)` when the source is exhausted or the
    /// user cancelled.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// The page detector a platform ships with. Camera access stays with the
/// platform's `CaptureSource`.
pub trait PlatformBridge: BoundaryDetector {
    /// Human-readable platform name.
    fn platform_name(&self) -> &str;
}
