// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// System V lp destination claim.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::PermissionsExt;

use crate::ResolverPaths;

/// Marker written to the front of stub interface programs that exist
/// only to satisfy vendor printing utilities.  A stub is not a real
/// printer and must not be claimed.
const STUB_MARKER: &[u8] = b"#UPRINT";

/// True if `name` is an lp class or printer.
pub fn claim(name: &str, paths: &ResolverPaths) -> bool {
    // A class is a membership file named after the group of printers.
    if paths.lp_classes.join(name).exists() {
        return true;
    }

    // A printer is an interface program, or on Solaris a directory of
    // configuration files.
    let printer = paths.lp_printers.join(name);
    if let Ok(meta) = printer.metadata() {
        if meta.is_dir() {
            return true;
        }
        if meta.permissions().mode() & 0o100 != 0 {
            return true;
        }
        return !is_stub(&printer);
    }

    // Solaris 2.6 keeps a flat list instead.
    if let Some(conf) = &paths.printers_conf {
        if let Ok(f) = File::open(conf) {
            for line in BufReader::new(f).lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.starts_with(|c: char| c.is_whitespace()) {
                    continue;
                }
                let Some((entry, _)) = line.split_once(':') else {
                    continue;
                };
                if entry == name {
                    return true;
                }
            }
        }
    }

    false
}

fn is_stub(path: &std::path::Path) -> bool {
    let Ok(mut f) = File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 7];
    matches!(f.read_exact(&mut magic), Ok(())) && magic == STUB_MARKER
}
