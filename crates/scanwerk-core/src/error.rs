// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.
//
// Each pipeline stage has its own error enum so callers can tell a
// recoverable per-page failure from a terminal assembly failure; all of
// them fold into `ScanError` at the coordinator boundary.

use thiserror::Error;

use crate::types::{SessionId, SessionState};

/// Failures while validating a quadrilateral or solving its homography.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("degenerate quadrilateral: {reason}")]
    Degenerate { reason: String },

    #[error("perspective system is ill-conditioned (condition number {condition:.3e})")]
    Singular { condition: f64 },
}

/// Failures while resampling a frame into a rectified page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RectifyError {
    #[error("rectified page of {requested} pixels exceeds the {limit} pixel limit")]
    OutOfMemory { requested: u64, limit: u64 },

    #[error("invalid rectifier input: {0}")]
    InvalidInput(String),
}

/// Usage errors on a page session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is {state:?} and can no longer be modified")]
    Closed { state: SessionState },

    #[error("page index {index} out of range (session has {len} pages)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("session has no pages to finalize")]
    Empty,

    #[error("session already holds the maximum of {limit} pages")]
    PageLimit { limit: usize },
}

/// Failures while writing or reading the PDF output.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("writing PDF output failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("encoding page {page} failed: {reason}")]
    EncodeFailed { page: usize, reason: String },

    #[error("a PDF document needs at least one page")]
    NoPages,

    #[error("malformed PDF: {0}")]
    Malformed(String),
}

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Capture --
    #[error("no document found in the captured frame")]
    NoDocumentFound,

    #[error("no scanning session is active")]
    NoActiveSession,

    #[error("session {0} is already active")]
    SessionActive(SessionId),

    // -- Per-page pipeline --
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Rectify(#[from] RectifyError),

    #[error(transparent)]
    Session(#[from] SessionError),

    // -- Output --
    /// The session's pages were consumed before the assembler failed, so the
    /// session cannot be resumed. The caller must start a new scan.
    #[error("assembling PDF for session {session} failed; the session cannot be resumed: {source}")]
    AssemblyFailed {
        session: SessionId,
        #[source]
        source: PdfError,
    },

    #[error(transparent)]
    Pdf(#[from] PdfError),

    /// Writing a page image out of the session failed. The session itself
    /// is untouched.
    #[error("exporting page {page} failed: {reason}")]
    Export { page: usize, reason: String },

    #[error("image processing failed: {0}")]
    Image(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),
}

impl ScanError {
    /// Per-page failures after which the session is still open and the
    /// caller may retry the same page.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoDocumentFound | Self::Geometry(_) | Self::Rectify(_) | Self::Image(_)
        )
    }

    /// Failures that ended the session; a new scan is required.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AssemblyFailed { .. })
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let geometry: ScanError = GeometryError::Singular { condition: 1e20 }.into();
        assert!(geometry.is_recoverable());
        assert!(!geometry.is_terminal());

        let session: ScanError = SessionError::Empty.into();
        assert!(!session.is_recoverable());

        let assembly = ScanError::AssemblyFailed {
            session: SessionId::new(),
            source: PdfError::WriteFailed(std::io::Error::other("disk full")),
        };
        assert!(assembly.is_terminal());
        assert!(!assembly.is_recoverable());
        assert!(assembly.to_string().contains("cannot be resumed"));
    }

    #[test]
    fn export_failure_is_not_a_capture_retry() {
        let export = ScanError::Export {
            page: 2,
            reason: "encoder refused the buffer".into(),
        };
        assert!(!export.is_recoverable());
        assert!(!export.is_terminal());
        assert!(ScanError::Image("unsupported format".into()).is_recoverable());
    }
}
