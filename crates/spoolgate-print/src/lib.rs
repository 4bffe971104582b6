// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolgate Print — the RFC 1179 wire client and its privilege-separated
// helper, the control-file codec, the three backend argv builders, and the
// submit/query/cancel entry points the front-end commands call.

pub mod argv_bsd;
pub mod argv_ppr;
pub mod argv_sysv;
pub mod control_file;
pub mod helper;
pub mod lpr_client;
pub mod queue_id;
pub mod run;
pub mod submit;

pub use lpr_client::LprConnection;
pub use submit::{cancel, query, submit, QueryFormat};
