// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how the front end presents it.

use crate::error::{ScanError, SessionError};

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Temporary condition; trying the same thing again may work.
    Transient,
    /// User must do something (retake the photo, free disk space).
    ActionRequired,
    /// Cannot be fixed by retrying; the scan has to start over or the
    /// request is invalid.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether repeating the same action can succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ScanError` into a `HumanError`.
pub fn humanize_error(err: &ScanError) -> HumanError {
    match err {
        // -- Capture --
        ScanError::NoDocumentFound => HumanError {
            message: "We couldn't find a page in that photo.".into(),
            suggestion: "Place the page on a darker surface, fit all four corners in view, and take the photo again.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        ScanError::NoActiveSession => HumanError {
            message: "There is no scan in progress.".into(),
            suggestion: "Start a new scan first.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::SessionActive(_) => HumanError {
            message: "A scan is already in progress.".into(),
            suggestion: "Finish or discard the current scan before starting another one.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Per-page pipeline --
        ScanError::Geometry(detail) => HumanError {
            message: "The page corners don't look right.".into(),
            suggestion: format!("Retake the photo from straight above the page, or adjust the corners. ({detail})"),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        ScanError::Rectify(detail) => HumanError {
            message: "We couldn't straighten this page.".into(),
            suggestion: format!("Try retaking the photo a little further away. ({detail})"),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        ScanError::Session(detail) => humanize_session_error(detail),

        // -- Output --
        ScanError::AssemblyFailed { source, .. } => HumanError {
            message: "We couldn't save your scanned document.".into(),
            suggestion: format!(
                "The pages from this scan are no longer available. Check there is free space on the device and scan the document again. ({source})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::Pdf(detail) => HumanError {
            message: "This PDF file can't be read.".into(),
            suggestion: format!("The file may be incomplete. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::Image(detail) => HumanError {
            message: "This picture can't be opened.".into(),
            suggestion: format!("Try a JPEG or PNG photo instead. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::Export { page, reason } => HumanError {
            message: format!("Page {} couldn't be saved as a picture.", page + 1),
            suggestion: format!("Your scan is still open. Try exporting again or save it as a PDF. ({reason})"),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Storage --
        ScanError::Io(io) => humanize_io(&io.to_string()),

        ScanError::Serialization(_) => HumanError {
            message: "Your scanner settings couldn't be read.".into(),
            suggestion: "The default settings will be used. Change them again if needed.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Platform --
        ScanError::Bridge(detail) => HumanError {
            message: "The camera or photo library isn't responding.".into(),
            suggestion: format!("Close and reopen the app, then try again. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

fn humanize_session_error(err: &SessionError) -> HumanError {
    match err {
        SessionError::Empty => HumanError {
            message: "There are no pages to save yet.".into(),
            suggestion: "Scan at least one page, then save.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        SessionError::PageLimit { limit } => HumanError {
            message: format!("This scan already has {limit} pages."),
            suggestion: "Save this document, then start a new scan for the remaining pages.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        SessionError::IndexOutOfRange { .. } | SessionError::Closed { .. } => HumanError {
            message: "That page can't be changed.".into(),
            suggestion: format!("Refresh the page list and try again. ({err})"),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

fn humanize_io(detail: &str) -> HumanError {
    let lower = detail.to_lowercase();

    if lower.contains("no space") || lower.contains("disk full") || lower.contains("quota") {
        HumanError {
            message: "The device is out of storage space.".into(),
            suggestion: "Delete some files or photos to free up space, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("permission denied") {
        HumanError {
            message: "We aren't allowed to save files there.".into(),
            suggestion: "Allow storage access for this app in the device settings, or choose another folder.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("not found") {
        HumanError {
            message: "The file or folder couldn't be found.".into(),
            suggestion: "Check that the file still exists and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: "Something went wrong while reading or writing a file.".into(),
            suggestion: format!("Try again. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GeometryError, PdfError};
    use crate::types::SessionId;

    #[test]
    fn no_document_is_retriable() {
        let human = humanize_error(&ScanError::NoDocumentFound);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.retriable);
    }

    #[test]
    fn degenerate_quad_asks_for_retake() {
        let err = ScanError::Geometry(GeometryError::Degenerate {
            reason: "collinear corners".into(),
        });
        let human = humanize_error(&err);
        assert!(human.retriable);
        assert!(human.suggestion.contains("collinear corners"));
    }

    #[test]
    fn assembly_failure_is_permanent() {
        let err = ScanError::AssemblyFailed {
            session: SessionId::new(),
            source: PdfError::WriteFailed(std::io::Error::other("No space left on device")),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }

    #[test]
    fn disk_full_is_action_required() {
        let err = ScanError::Io(std::io::Error::other("No space left on device"));
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn export_failure_names_the_page() {
        let human = humanize_error(&ScanError::Export {
            page: 0,
            reason: "bad buffer".into(),
        });
        assert!(human.message.contains("Page 1"));
        assert_eq!(human.severity, Severity::Transient);
    }

    #[test]
    fn empty_session_is_action_required() {
        let human = humanize_error(&ScanError::Session(SessionError::Empty));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }
}
