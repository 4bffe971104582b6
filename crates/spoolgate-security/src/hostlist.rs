// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The legacy flat host lists and netgroups.  hosts.lpd and hosts.equiv
// carry one pattern per line; a leading dot makes the pattern a domain
// suffix, and anything after the first whitespace is ignored.  A host
// matched by hosts.lpd_deny is rejected no matter what the other two
// files say.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the legacy lists live.  Tests point these at temporary files.
#[derive(Debug, Clone)]
pub struct HostLists {
    pub lpd: PathBuf,
    pub equiv: PathBuf,
    pub deny: PathBuf,
    pub netgroup: PathBuf,
}

impl Default for HostLists {
    fn default() -> Self {
        Self {
            lpd: PathBuf::from("/etc/hosts.lpd"),
            equiv: PathBuf::from("/etc/hosts.equiv"),
            deny: PathBuf::from("/etc/hosts.lpd_deny"),
            netgroup: PathBuf::from("/etc/netgroup"),
        }
    }
}

/// True if `pattern` names `hostname` or a domain that contains it.
pub fn pattern_matches(pattern: &str, hostname: &str) -> bool {
    if pattern.starts_with('.') {
        hostname.len() > pattern.len()
            && hostname[hostname.len() - pattern.len()..].eq_ignore_ascii_case(pattern)
    } else {
        pattern.eq_ignore_ascii_case(hostname)
    }
}

/// True if the file at `path` has a line matching `hostname`.  A
/// missing or unreadable file authorizes nothing.
pub fn file_authorizes(path: &Path, hostname: &str) -> bool {
    let Ok(text) = fs::read_to_string(path) else {
        return false;
    };
    text.lines().any(|line| {
        let pattern = line
            .split([' ', '\t'])
            .next()
            .unwrap_or("");
        !pattern.is_empty() && pattern_matches(pattern, hostname)
    })
}

/// The traditional LPD answer: listed in hosts.lpd or hosts.equiv and
/// not struck out by hosts.lpd_deny.
pub fn traditionally_authorized(lists: &HostLists, hostname: &str) -> bool {
    let allowed =
        file_authorizes(&lists.lpd, hostname) || file_authorizes(&lists.equiv, hostname);
    allowed && !file_authorizes(&lists.deny, hostname)
}

/// One netgroup member: either a nested group name or the host field
/// of a `(host,user,domain)` triple.
enum Member<'a> {
    Group(&'a str),
    Host(&'a str),
}

fn parse_members(body: &str) -> Vec<Member<'_>> {
    let mut members = Vec::new();
    for word in body.split_whitespace() {
        if let Some(triple) = word.strip_prefix('(') {
            let host = triple.split([',', ')']).next().unwrap_or("");
            if !host.is_empty() && host != "-" {
                members.push(Member::Host(host));
            }
        } else {
            members.push(Member::Group(word));
        }
    }
    members
}

/// True if `hostname` appears in the host position of `group` in the
/// netgroup file, following nested groups.  Cycles are tolerated.
pub fn netgroup_contains(path: &Path, group: &str, hostname: &str) -> bool {
    let Ok(text) = fs::read_to_string(path) else {
        return false;
    };

    // Fold continuation lines before splitting into entries.
    let joined = text.replace("\\\n", " ");

    let mut pending = vec![group.to_string()];
    let mut visited = HashSet::new();

    while let Some(wanted) = pending.pop() {
        if !visited.insert(wanted.clone()) {
            continue;
        }
        for line in joined.lines() {
            let line = line.split(['#']).next().unwrap_or("");
            let mut words = line.split_whitespace();
            if words.next() != Some(wanted.as_str()) {
                continue;
            }
            let body = line
                .trim_start()
                .strip_prefix(wanted.as_str())
                .unwrap_or("");
            for member in parse_members(body) {
                match member {
                    Member::Host(host) => {
                        if host.eq_ignore_ascii_case(hostname) {
                            return true;
                        }
                    }
                    Member::Group(nested) => pending.push(nested.to_string()),
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lists_in(dir: &TempDir) -> HostLists {
        HostLists {
            lpd: dir.path().join("hosts.lpd"),
            equiv: dir.path().join("hosts.equiv"),
            deny: dir.path().join("hosts.lpd_deny"),
            netgroup: dir.path().join("netgroup"),
        }
    }

    #[test]
    fn exact_and_suffix_patterns() {
        assert!(pattern_matches("wks5.example.edu", "WKS5.example.edu"));
        assert!(pattern_matches(".example.edu", "wks5.example.edu"));
        assert!(!pattern_matches(".example.edu", "example.edu"));
        assert!(!pattern_matches(".example.edu", "wks5.example.com"));
        assert!(!pattern_matches("wks5", "wks5.example.edu"));
    }

    #[test]
    fn trailing_text_on_a_line_is_ignored() {
        let dir = TempDir::new().unwrap();
        let lists = lists_in(&dir);
        std::fs::write(&lists.lpd, "wks5.example.edu mary\n.lab.example.edu\n").unwrap();
        assert!(file_authorizes(&lists.lpd, "wks5.example.edu"));
        assert!(file_authorizes(&lists.lpd, "pc9.lab.example.edu"));
        assert!(!file_authorizes(&lists.lpd, "mary"));
    }

    #[test]
    fn deny_list_overrides_the_allow_lists() {
        let dir = TempDir::new().unwrap();
        let lists = lists_in(&dir);
        std::fs::write(&lists.lpd, ".example.edu\n").unwrap();
        std::fs::write(&lists.deny, "badhost.example.edu\n").unwrap();
        assert!(traditionally_authorized(&lists, "wks5.example.edu"));
        assert!(!traditionally_authorized(&lists, "badhost.example.edu"));
        assert!(!traditionally_authorized(&lists, "wks5.example.com"));
    }

    #[test]
    fn missing_files_authorize_nobody() {
        let dir = TempDir::new().unwrap();
        let lists = lists_in(&dir);
        assert!(!traditionally_authorized(&lists, "wks5.example.edu"));
    }

    #[test]
    fn netgroups_follow_nesting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("netgroup");
        std::fs::write(
            &path,
            "lab (pc1.example.edu,,) (pc2.example.edu,,)\n\
             printhosts lab (server.example.edu,root,)\n",
        )
        .unwrap();
        assert!(netgroup_contains(&path, "printhosts", "pc2.example.edu"));
        assert!(netgroup_contains(&path, "printhosts", "server.example.edu"));
        assert!(!netgroup_contains(&path, "lab", "server.example.edu"));
        assert!(!netgroup_contains(&path, "nosuch", "pc1.example.edu"));
    }

    #[test]
    fn netgroup_cycles_terminate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("netgroup");
        std::fs::write(&path, "a b\nb a (deep.example.edu,,)\n").unwrap();
        assert!(netgroup_contains(&path, "a", "deep.example.edu"));
        assert!(!netgroup_contains(&path, "a", "absent.example.edu"));
    }
}
