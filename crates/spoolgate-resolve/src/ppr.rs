// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PPR destination claim.

use crate::ResolverPaths;

/// True if `name` is a PPR alias, group, or printer.  Aliases shadow
/// groups, groups shadow printers, so the directories are probed in
/// that order.
pub fn claim(name: &str, paths: &ResolverPaths) -> bool {
    for dir in [&paths.ppr_aliases, &paths.ppr_groups, &paths.ppr_printers] {
        if dir.join(name).is_file() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn any_of_the_three_directories_claims() {
        let dir = TempDir::new().unwrap();
        let paths = ResolverPaths {
            ppr_aliases: dir.path().join("aliases"),
            ppr_groups: dir.path().join("groups"),
            ppr_printers: dir.path().join("printers"),
            ..ResolverPaths::default()
        };
        for d in [&paths.ppr_aliases, &paths.ppr_groups, &paths.ppr_printers] {
            fs::create_dir(d).unwrap();
        }

        fs::write(paths.ppr_groups.join("lab"), "").unwrap();
        assert!(claim("lab", &paths));
        assert!(!claim("other", &paths));
    }

    #[test]
    fn missing_directories_claim_nothing() {
        let dir = TempDir::new().unwrap();
        let paths = ResolverPaths {
            ppr_aliases: dir.path().join("aliases"),
            ppr_groups: dir.path().join("groups"),
            ppr_printers: dir.path().join("printers"),
            ..ResolverPaths::default()
        };
        assert!(!claim("anything", &paths));
    }
}
