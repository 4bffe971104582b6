// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolgate-security — Who may connect, and as whom their work runs.
//
// Three concerns live here: the sectioned access-control file that decides
// what a connecting host is allowed to do, the legacy flat host lists and
// netgroups it can defer to, and the uid arithmetic that turns a remote
// username into a local identity without ever trusting the peer.

pub mod access;
pub mod hostlist;
pub mod identity;

pub use access::{AccessControl, AccessDecision};
pub use identity::{proxy_identity, safe_uid_setup, ProxyIdentity};
