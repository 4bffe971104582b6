// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolgate — Core job model and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod limits;
pub mod types;
pub mod xlate;

pub use config::UprintConf;
pub use error::{Result, SpoolError};
pub use types::*;
