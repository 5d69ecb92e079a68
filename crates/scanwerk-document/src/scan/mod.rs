// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline — per-page enhancement and the coordinator that runs
// capture sessions end to end.

pub mod coordinator;
pub mod enhance;

pub use coordinator::{BatchItem, CoordinatorState, ScanCoordinator};
pub use enhance::ScanEnhancer;
