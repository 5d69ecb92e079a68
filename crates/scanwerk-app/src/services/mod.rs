// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer — settings persistence and the scan run that drives the
// document crate on behalf of the command line.

pub mod app_services;
pub mod data_dir;
