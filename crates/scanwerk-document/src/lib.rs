// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-document — the document side of Scanwerk.
//
// Validates page outlines and solves their perspective transforms, resamples
// captured frames into flat pages, keeps them in an ordered session, and
// streams finished sessions out as image-per-page PDFs.

pub mod geometry;
pub mod image;
pub mod pdf;
pub mod rectify;
pub mod scan;
pub mod session;

pub use geometry::{GeometryEngine, PerspectiveTransform, compute_transform};
pub use crate::image::ImageProcessor;
pub use pdf::{AssemblyReport, PdfAssembler, PdfOptions, PdfReader};
pub use rectify::PageRectifier;
pub use scan::{CoordinatorState, ScanCoordinator, ScanEnhancer};
pub use session::{Page, PageSession};
