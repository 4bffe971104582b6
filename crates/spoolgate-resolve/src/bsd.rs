// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// BSD lpr destination claim.
//
// This is not a complete printcap(5) parser.  It only needs to recognize
// queue names and aliases, which all live on entry header lines before
// the first colon, so continuation lines are skipped without further
// interpretation.

use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::ResolverPaths;

/// True if `name` matches a queue name or alias in the printcap.
pub fn claim(name: &str, paths: &ResolverPaths) -> bool {
    let Ok(f) = File::open(&paths.printcap) else {
        return false;
    };

    for line in BufReader::new(f).lines() {
        let Ok(line) = line else {
            return false;
        };
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        // Some vendor configuration tools emit a single leading space
        // before the first line of each entry.
        let head = line.trim_start_matches([' ', '\t']);

        if head.starts_with('#') {
            continue;
        }
        // A leading colon marks a continuation line carrying capability
        // settings, not names.
        if head.starts_with(':') {
            continue;
        }

        // The alias list ends at the first colon.  A line without one
        // carries no names.
        let Some((names, _)) = head.split_once(':') else {
            continue;
        };

        if names.split('|').any(|alias| alias == name) {
            return true;
        }
    }

    false
}
