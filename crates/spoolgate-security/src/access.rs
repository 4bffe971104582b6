// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The sectioned access-control file.  Every connecting host gets a
// decision assembled from the `[global]` section overlaid by the best
// matching host section; `[traditional]` stands in for hosts the legacy
// flat lists vouch for, and `[other]` catches everyone else.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use spoolgate_core::{Result, SpoolError};

use crate::hostlist::{self, HostLists};

/// Default location of the access-control file.
pub const LPRSRV_CONF: &str = "/etc/ppr/lprsrv.conf";

// ---------------------------------------------------------------------
// Value length caps.  Overlong values are clipped with a warning, the
// way the original server treated them.
// ---------------------------------------------------------------------
const MAX_USERNAME: usize = 16;
const MAX_PROXY_CLASS: usize = 64;
const MAX_FROM_FORMAT: usize = 16;

/// What a connecting host is allowed to do and as whom its work runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessDecision {
    /// May the host connect at all?
    pub allow: bool,
    /// Accept connections from source ports above 1023.
    pub insecure_ports: bool,
    /// Run PPR-queue work as the requested user rather than the proxy.
    pub ppr_become_user: bool,
    /// Likewise for queues owned by other spoolers.
    pub other_become_user: bool,
    /// Local substitute when the requested user is root.
    pub ppr_root_as: String,
    pub other_root_as: String,
    /// Identity used when the requested user cannot be honored.
    pub ppr_proxy_user: String,
    pub other_proxy_user: String,
    /// Proxy class for PPR submissions; `$cname` means the client's
    /// hostname.
    pub ppr_proxy_class: String,
    /// `-f` format for PPR submissions, e.g. `$user@$host`.
    pub ppr_from_format: String,
}

/// Resolver over one access-control file and the legacy host lists.
#[derive(Debug, Clone)]
pub struct AccessControl {
    pub conf: PathBuf,
    pub lists: HostLists,
}

impl Default for AccessControl {
    fn default() -> Self {
        Self {
            conf: PathBuf::from(LPRSRV_CONF),
            lists: HostLists::default(),
        }
    }
}

/// How strongly a section header claims a hostname.  Netgroup and
/// file patterns always rank below the shortest textual match.
fn match_strength(header: &str, hostname: &str, lists: &HostLists) -> Option<usize> {
    if let Some(group) = header.strip_prefix('@') {
        return hostlist::netgroup_contains(&lists.netgroup, group, hostname).then_some(0);
    }
    if header.starts_with('/') {
        return hostlist::file_authorizes(Path::new(header), hostname).then_some(0);
    }
    hostlist::pattern_matches(header, hostname).then_some(header.len())
}

struct Section<'a> {
    header: &'a str,
    body: Vec<&'a str>,
}

fn split_sections(text: &str) -> Vec<Section<'_>> {
    let mut sections: Vec<Section> = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix('[') {
            if let Some((header, _)) = rest.split_once(']') {
                sections.push(Section {
                    header,
                    body: Vec::new(),
                });
            }
            continue;
        }
        if let Some(current) = sections.last_mut() {
            current.body.push(line);
        }
    }
    sections
}

fn clip_into(slot: &mut String, value: &str, max: usize, key: &str, linenum: usize) {
    if value.len() > max {
        warn!(key, linenum, "access-control value is too long, clipping");
    }
    *slot = value.chars().take(max).collect();
}

fn apply_section(decision: &mut AccessDecision, section: &Section<'_>) {
    for (offset, raw) in section.body.iter().enumerate() {
        let linenum = offset + 1;

        // Strip all whitespace; a comment character ends the line.
        let line: String = raw
            .chars()
            .take_while(|c| *c != ';' && *c != '#')
            .filter(|c| !c.is_whitespace())
            .collect();
        if line.is_empty() {
            continue;
        }

        let Some((name, value)) = line.split_once('=') else {
            warn!(linenum, section = section.header, "line is not name=value");
            continue;
        };
        if value.is_empty() {
            warn!(linenum, section = section.header, name, "value missing");
            continue;
        }
        let name = name.to_ascii_lowercase();

        let mut torf = |slot: &mut bool| match spoolgate_core::config::parse_torf(value) {
            Some(answer) => *slot = answer,
            None => warn!(linenum, name = %name, value, "invalid boolean value"),
        };

        match name.as_str() {
            "allow" => torf(&mut decision.allow),
            "insecureports" => torf(&mut decision.insecure_ports),
            "pprbecomeuser" => torf(&mut decision.ppr_become_user),
            "otherbecomeuser" => torf(&mut decision.other_become_user),
            "pprrootas" => {
                clip_into(&mut decision.ppr_root_as, value, MAX_USERNAME, "pprrootas", linenum)
            }
            "otherrootas" => clip_into(
                &mut decision.other_root_as,
                value,
                MAX_USERNAME,
                "otherrootas",
                linenum,
            ),
            "pprproxyuser" => clip_into(
                &mut decision.ppr_proxy_user,
                value,
                MAX_USERNAME,
                "pprproxyuser",
                linenum,
            ),
            "otherproxyuser" => clip_into(
                &mut decision.other_proxy_user,
                value,
                MAX_USERNAME,
                "otherproxyuser",
                linenum,
            ),
            "pprproxyclass" => clip_into(
                &mut decision.ppr_proxy_class,
                value,
                MAX_PROXY_CLASS,
                "pprproxyclass",
                linenum,
            ),
            "ppruserformat" => clip_into(
                &mut decision.ppr_from_format,
                value,
                MAX_FROM_FORMAT,
                "ppruserformat",
                linenum,
            ),
            _ => warn!(linenum, section = section.header, name = %name, "unrecognized keyword"),
        }
    }
}

impl AccessControl {
    /// Decide what `hostname` may do.
    ///
    /// `[global]` is read first and must set every string field; then
    /// the longest-matching host section is overlaid, falling back to
    /// `[traditional]` (when the legacy lists vouch for the host) and
    /// finally `[other]`.
    pub fn resolve(&self, hostname: &str) -> Result<AccessDecision> {
        let text = fs::read_to_string(&self.conf).map_err(|e| {
            SpoolError::Config(format!("can't open \"{}\": {e}", self.conf.display()))
        })?;
        let sections = split_sections(&text);

        let global = sections
            .iter()
            .find(|s| s.header == "global")
            .ok_or_else(|| {
                SpoolError::Config(format!("no [global] section in \"{}\"", self.conf.display()))
            })?;
        let other = sections
            .iter()
            .find(|s| s.header == "other")
            .ok_or_else(|| {
                SpoolError::Config(format!("no [other] section in \"{}\"", self.conf.display()))
            })?;
        let traditional = sections.iter().find(|s| s.header == "traditional");

        let mut decision = AccessDecision::default();
        apply_section(&mut decision, global);

        for (field, key) in [
            (&decision.ppr_root_as, "ppr root as"),
            (&decision.other_root_as, "other root as"),
            (&decision.ppr_proxy_user, "ppr proxy user"),
            (&decision.other_proxy_user, "other proxy user"),
            (&decision.ppr_proxy_class, "ppr proxy class"),
            (&decision.ppr_from_format, "ppr user format"),
        ] {
            if field.is_empty() {
                return Err(SpoolError::Config(format!(
                    "no \"{key} =\" in \"{}\" [global]",
                    self.conf.display()
                )));
            }
        }

        let mut best: Option<(usize, &Section)> = None;
        for section in &sections {
            if matches!(section.header, "global" | "other" | "traditional") {
                continue;
            }
            if let Some(strength) = match_strength(section.header, hostname, &self.lists) {
                if best.is_none_or(|(len, _)| strength >= len) {
                    best = Some((strength, section));
                }
            }
        }

        let chosen = match best {
            Some((strength, section)) => {
                debug!(hostname, section = section.header, strength, "host section matched");
                section
            }
            None if traditional.is_some()
                && hostlist::traditionally_authorized(&self.lists, hostname) =>
            {
                debug!(hostname, "legacy host lists matched, using [traditional]");
                traditional.unwrap_or(other)
            }
            None => other,
        };
        apply_section(&mut decision, chosen);

        Ok(decision)
    }
}
