// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — streaming assembly of scanned pages and read-back inspection.

pub mod assembler;
pub mod reader;

pub use assembler::{AssemblyReport, PdfAssembler, PdfOptions, assemble};
pub use reader::{PageImage, PdfReader, is_complete, verify_xref};
