// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote destination claim: the uprint-remote.conf table.
//
// Section headers are shell-wildcard patterns matched against the queue
// name.  The first matching section supplies the remote host, the remote
// queue name, and the capability flags that decide which vendor extension
// lines later appear in control files sent to that host.

use std::fs::File;
use std::io::{BufRead, BufReader};

use serde::{Deserialize, Serialize};
use tracing::warn;

use spoolgate_core::config::parse_torf;
use spoolgate_core::limits::MAX_QUEUE;
use spoolgate_core::{Result, SpoolError};

use crate::ResolverPaths;

/// Where and how to reach a queue on another host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDestination {
    /// Host (or comma/space separated list of fallback hosts), with an
    /// optional `:port` suffix.
    pub node: String,
    /// Queue name on the remote host.
    pub printer: String,
    pub osf_extensions: bool,
    pub solaris_extensions: bool,
    pub ppr_extensions: bool,
}

/// Capability flags by remote system type.  Version numbers are
/// minimums.  The whole table is scanned and the last matching row
/// wins, so later rows refine earlier ones for newer versions.
const SYSTEMS: &[(&str, f32, bool, bool, bool)] = &[
    ("BSD", 4.2, false, false, false),
    ("SUNOS", 0.00, false, false, false),
    ("SUNOS", 5.00, false, true, false),
    ("Solaris", 1.0, false, false, false),
    ("Solaris", 2.0, false, true, false),
    ("PPR", 1.00, false, false, false),
    ("PPR", 1.32, true, false, true),
    ("PPR", 1.40, true, true, true),
    ("WinNT", 3.10, false, false, false),
    ("RedHat", 0.00, false, false, false),
];

fn bad(queue: &str, detail: String) -> SpoolError {
    SpoolError::MalformedRemoteConfig {
        queue: queue.to_string(),
        detail,
    }
}

/// Look `dest` up in the remote-queue table.
///
/// `Ok(None)` when the table is missing or no section pattern matches;
/// an error when a section matches but cannot be used, so callers can
/// distinguish "not ours" from "ours but broken".
pub fn claim(dest: &str, paths: &ResolverPaths) -> Result<Option<RemoteDestination>> {
    let f = match File::open(&paths.remote_conf) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            warn!(path = %paths.remote_conf.display(), error = %e, "cannot open remote queue table");
            return Ok(None);
        }
    };

    let mut lines = BufReader::new(f).lines();
    let mut linenum = 0usize;

    // Find the first section whose pattern matches.
    loop {
        let Some(line) = lines.next() else {
            return Ok(None);
        };
        let line = line?;
        linenum += 1;

        let header = line.trim_end();
        let Some(rest) = header.strip_prefix('[') else {
            continue;
        };
        let pattern = rest.split(']').next().unwrap_or(rest);

        if !wildcard_match(dest, pattern) {
            continue;
        }

        // The requested name is the default remote queue name, when it
        // fits.
        let mut found = RemoteDestination::default();
        if dest.len() <= MAX_QUEUE {
            found.printer = dest.to_string();
        }
        let mut node = None;

        for line in lines.by_ref() {
            let line = line?;
            linenum += 1;

            if line.starts_with(['#', ';']) {
                continue;
            }
            if line.starts_with('[') {
                break;
            }

            let Some((raw_name, raw_value)) = line.split_once('=') else {
                continue;
            };
            let name: String = raw_name
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            let value = raw_value.trim();

            match name.as_str() {
                "remotehost" => node = Some(value.to_string()),
                "remoteprinter" => {
                    if value.len() > MAX_QUEUE {
                        return Err(bad(
                            dest,
                            format!("remoteprinter value too long at line {linenum}"),
                        ));
                    }
                    found.printer = value.to_string();
                }
                "osfextensions" => {
                    found.osf_extensions = boolean_value(dest, "osfextensions", value, linenum)?;
                }
                "solarisextensions" => {
                    found.solaris_extensions =
                        boolean_value(dest, "solarisextensions", value, linenum)?;
                }
                "pprextensions" => {
                    found.ppr_extensions = boolean_value(dest, "pprextensions", value, linenum)?;
                }
                "remotesystemtype" => {
                    apply_system_type(dest, value, linenum, &mut found)?;
                }
                // Undefined names are not discouraged.
                _ => {}
            }
        }

        match node {
            Some(n) if !n.is_empty() && !found.printer.is_empty() => {
                found.node = n;
                return Ok(Some(found));
            }
            _ => {
                return Err(bad(dest, "remote host or queue not defined".to_string()));
            }
        }
    }
}

fn wildcard_match(name: &str, pattern: &str) -> bool {
    match fnmatch_regex::glob_to_regex(pattern) {
        Ok(re) => re.is_match(name),
        Err(e) => {
            warn!(pattern, error = %e, "unusable remote queue pattern");
            false
        }
    }
}

fn boolean_value(queue: &str, keyword: &str, value: &str, linenum: usize) -> Result<bool> {
    parse_torf(value)
        .ok_or_else(|| bad(queue, format!("{keyword} must be boolean at line {linenum}")))
}

fn apply_system_type(
    queue: &str,
    value: &str,
    linenum: usize,
    found: &mut RemoteDestination,
) -> Result<()> {
    let mut words = value.split_whitespace();
    let (Some(system), Some(version)) = (words.next(), words.next()) else {
        return Err(bad(
            queue,
            format!("wrong format for remotesystemtype at line {linenum}"),
        ));
    };
    let version: f32 = version
        .parse()
        .map_err(|_| bad(queue, format!("wrong format for remotesystemtype at line {linenum}")))?;

    let mut matched = false;
    for &(name, minimum, osf, solaris, ppr) in SYSTEMS {
        if system.eq_ignore_ascii_case(name) && version >= minimum {
            found.osf_extensions = osf;
            found.solaris_extensions = solaris;
            found.ppr_extensions = ppr;
            matched = true;
        }
    }
    if !matched {
        return Err(bad(
            queue,
            format!("unrecognized system \"{system}\" {version:.2} at line {linenum}"),
        ));
    }
    Ok(())
}
