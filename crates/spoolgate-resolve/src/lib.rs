// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolgate-resolve — Destination resolution for the Spoolgate suite.
//
// Answers the question "which spooling system owns this queue name?" by
// probing PPR's configuration directories, the BSD printcap, the System V
// lp configuration, and finally the remote-queue table.  First claim wins,
// and later backends are never consulted once an earlier one has claimed
// the name.

pub mod bsd;
pub mod ppr;
pub mod remote;
pub mod sysv;

use std::path::PathBuf;

use tracing::debug;

use spoolgate_core::Result;

pub use remote::RemoteDestination;

/// Which spooling system claimed a destination name.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A PPR alias, group, or printer.
    Ppr,
    /// An entry in the BSD printcap.
    Bsd,
    /// A System V lp class or printer.
    Sysv,
    /// A queue on another host, reached over RFC 1179.
    Remote(RemoteDestination),
}

impl Resolution {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Resolution::Ppr => "ppr",
            Resolution::Bsd => "bsd",
            Resolution::Sysv => "sysv",
            Resolution::Remote(_) => "remote",
        }
    }
}

/// Everywhere the claim probes look.  Defaults are the conventional Unix
/// locations; tests point them at temporary directories.
#[derive(Debug, Clone)]
pub struct ResolverPaths {
    /// PPR alias configuration directory.
    pub ppr_aliases: PathBuf,
    /// PPR group configuration directory.
    pub ppr_groups: PathBuf,
    /// PPR printer configuration directory.
    pub ppr_printers: PathBuf,
    /// The BSD printcap file.
    pub printcap: PathBuf,
    /// System V lp class membership directory.
    pub lp_classes: PathBuf,
    /// System V lp printer directory (interface programs, or per-printer
    /// configuration directories on Solaris).
    pub lp_printers: PathBuf,
    /// Solaris 2.6 style flat printer list, when the system has one.
    pub printers_conf: Option<PathBuf>,
    /// The remote-queue table.
    pub remote_conf: PathBuf,
}

impl Default for ResolverPaths {
    fn default() -> Self {
        Self {
            ppr_aliases: PathBuf::from("/etc/ppr/aliases"),
            ppr_groups: PathBuf::from("/etc/ppr/groups"),
            ppr_printers: PathBuf::from("/etc/ppr/printers"),
            printcap: PathBuf::from("/etc/printcap"),
            lp_classes: PathBuf::from("/etc/lp/classes"),
            lp_printers: PathBuf::from("/etc/lp/printers"),
            printers_conf: Some(PathBuf::from("/etc/printers.conf")),
            remote_conf: PathBuf::from("/etc/ppr/uprint-remote.conf"),
        }
    }
}

/// Resolve a destination name to the spooling system that owns it.
///
/// Probe order is PPR, then BSD, then System V, then (only when
/// `remote_too` is set) the remote table.  `Ok(None)` means no backend
/// claimed the name; an error means a backend claimed it but its
/// configuration is unusable, which callers must report differently
/// from an unknown destination.
pub fn resolve(name: &str, paths: &ResolverPaths, remote_too: bool) -> Result<Option<Resolution>> {
    // Queue names double as file names under the configuration
    // directories, so path separators and dot-relative names can never
    // claim anything.
    if name.is_empty() || name.contains('/') || name.starts_with('.') {
        debug!(name, "destination name cannot be a queue");
        return Ok(None);
    }

    if ppr::claim(name, paths) {
        debug!(name, backend = "ppr", "destination claimed");
        return Ok(Some(Resolution::Ppr));
    }

    if bsd::claim(name, paths) {
        debug!(name, backend = "bsd", "destination claimed");
        return Ok(Some(Resolution::Bsd));
    }

    if sysv::claim(name, paths) {
        debug!(name, backend = "sysv", "destination claimed");
        return Ok(Some(Resolution::Sysv));
    }

    if remote_too {
        if let Some(dest) = remote::claim(name, paths)? {
            debug!(name, backend = "remote", node = %dest.node, "destination claimed");
            return Ok(Some(Resolution::Remote(dest)));
        }
    }

    debug!(name, "destination unclaimed");
    Ok(None)
}
