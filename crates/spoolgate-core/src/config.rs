// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The uprint.conf layer: where the real spooler commands live and which
// queue to use when the caller names none.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default location of the configuration file.  Its owner doubles as
/// the unprivileged identity the daemons parse configuration under.
pub const UPRINT_CONF: &str = "/etc/ppr/uprint.conf";

// Installed locations of the PPR spooler this suite fronts for.
pub const PPR_PATH: &str = "/usr/lib/ppr/bin/ppr";
pub const PPOP_PATH: &str = "/usr/lib/ppr/bin/ppop";
/// The daemons chdir here on startup.
pub const HOME_DIR: &str = "/usr/lib/ppr";

/// Short-lived temporary files.
pub const TEMP_DIR: &str = "/tmp";
/// PPR's spool area; disk-space admission checks watch it.
pub const QUEUE_DIR: &str = "/var/spool/ppr/queue";
pub const LOG_DIR: &str = "/var/spool/ppr/logs";
pub const RUN_DIR: &str = "/var/spool/ppr/run";
/// Counter file behind the lpr queue-id sequence, under [`RUN_DIR`].
pub const LPR_PREVID_FILE: &str = "/var/spool/ppr/run/lastid_uprint_lpr";

/// One set of spooler command paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSet {
    pub lpr: Option<PathBuf>,
    pub lpq: Option<PathBuf>,
    pub lprm: Option<PathBuf>,
    pub lp: Option<PathBuf>,
    pub lpstat: Option<PathBuf>,
    pub cancel: Option<PathBuf>,
}

impl PathSet {
    fn warn_undefined(&self, section: &str) {
        for (keyword, value) in [
            ("lpr", &self.lpr),
            ("lpq", &self.lpq),
            ("lprm", &self.lprm),
            ("lp", &self.lp),
            ("lpstat", &self.lpstat),
            ("cancel", &self.cancel),
        ] {
            if value.is_none() {
                warn!(section, keyword, "uprint.conf value is undefined");
            }
        }
    }
}

/// Parsed uprint.conf.
///
/// `[well known]` holds the paths the vendor spoolers normally live at;
/// `[sidelined]` holds where they were moved when this suite's wrappers
/// took over their names.  The per-flavor `sidelined` flags pick which
/// set the accessors answer from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UprintConf {
    pub well_known: PathSet,
    pub sidelined: PathSet,
    pub lpr_sidelined: bool,
    pub lp_sidelined: bool,
    pub default_dest_lpr: Option<String>,
    pub default_dest_lp: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Init,
    WellKnown,
    Sidelined,
    RealLpr,
    RealLp,
    Ppr,
    DefaultDestinations,
}

impl UprintConf {
    /// Load and parse. A missing file is only a warning; every accessor
    /// then answers its fallback, matching the historical behavior of
    /// running before the configuration is installed.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open uprint.conf");
                return Self::default();
            }
        };
        let conf = Self::parse(&text, path);
        conf.well_known.warn_undefined("well known");
        conf.sidelined.warn_undefined("sidelined");
        conf
    }

    fn parse(text: &str, path: &Path) -> Self {
        let mut conf = Self::default();
        let mut section = Section::Init;

        for (idx, raw) in text.lines().enumerate() {
            let linenum = idx + 1;
            if raw.starts_with([';', '#']) || raw.is_empty() {
                continue;
            }

            if raw.starts_with('[') {
                section = match raw {
                    r if r.starts_with("[well known]") => Section::WellKnown,
                    r if r.starts_with("[sidelined]") => Section::Sidelined,
                    r if r.starts_with("[real lpr]") || r.starts_with("[to lpr]") => {
                        Section::RealLpr
                    }
                    r if r.starts_with("[real lp]") || r.starts_with("[to lp]") => Section::RealLp,
                    r if r.starts_with("[ppr]") => Section::Ppr,
                    r if r.starts_with("[default destinations]") => Section::DefaultDestinations,
                    _ => Section::Init,
                };
                if section != Section::Init {
                    continue;
                }
            }

            // Keys and values are matched with all whitespace removed.
            let line: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            if line.is_empty() || line.starts_with([';', '#']) {
                continue;
            }

            let claimed = match section {
                Section::Init => false,
                Section::WellKnown | Section::Sidelined => {
                    let set = if section == Section::WellKnown {
                        &mut conf.well_known
                    } else {
                        &mut conf.sidelined
                    };
                    Self::parse_path_key(set, &line)
                }
                Section::RealLpr => Self::parse_sidelined_flag(
                    &line,
                    &mut conf.lpr_sidelined,
                    "[real lpr]",
                    path,
                ),
                Section::RealLp => {
                    Self::parse_sidelined_flag(&line, &mut conf.lp_sidelined, "[real lp]", path)
                }
                Section::Ppr => true,
                Section::DefaultDestinations => {
                    if let Some(v) = line.strip_prefix("uprint-lp=") {
                        conf.default_dest_lp = Some(v.to_string());
                    } else if let Some(v) = line.strip_prefix("uprint-lpr=") {
                        conf.default_dest_lpr = Some(v.to_string());
                    }
                    true
                }
            };

            if !claimed {
                warn!(path = %path.display(), linenum, line = %line, "ignoring uprint.conf line");
            }
        }

        conf
    }

    fn parse_path_key(set: &mut PathSet, line: &str) -> bool {
        for (key, slot) in [
            ("lpr=", &mut set.lpr),
            ("lpq=", &mut set.lpq),
            ("lprm=", &mut set.lprm),
            ("lp=", &mut set.lp),
            ("lpstat=", &mut set.lpstat),
            ("cancel=", &mut set.cancel),
        ] {
            if let Some(v) = line.strip_prefix(key) {
                *slot = Some(PathBuf::from(v));
                return true;
            }
        }
        false
    }

    fn parse_sidelined_flag(line: &str, flag: &mut bool, section: &str, path: &Path) -> bool {
        let Some(value) = line.strip_prefix("sidelined=") else {
            return false;
        };
        match parse_torf(value) {
            Some(b) => *flag = b,
            None => {
                warn!(path = %path.display(), section, value, "invalid sidelined value");
            }
        }
        true
    }

    pub fn path_lpr(&self) -> Option<&Path> {
        self.pick_lpr(|s| &s.lpr)
    }

    pub fn path_lpq(&self) -> Option<&Path> {
        self.pick_lpr(|s| &s.lpq)
    }

    pub fn path_lprm(&self) -> Option<&Path> {
        self.pick_lpr(|s| &s.lprm)
    }

    pub fn path_lp(&self) -> Option<&Path> {
        self.pick_lp(|s| &s.lp)
    }

    pub fn path_lpstat(&self) -> Option<&Path> {
        self.pick_lp(|s| &s.lpstat)
    }

    pub fn path_cancel(&self) -> Option<&Path> {
        self.pick_lp(|s| &s.cancel)
    }

    fn pick_lpr<'a>(&'a self, get: impl Fn(&'a PathSet) -> &'a Option<PathBuf>) -> Option<&'a Path> {
        let set = if self.lpr_sidelined {
            &self.sidelined
        } else {
            &self.well_known
        };
        get(set).as_deref()
    }

    fn pick_lp<'a>(&'a self, get: impl Fn(&'a PathSet) -> &'a Option<PathBuf>) -> Option<&'a Path> {
        let set = if self.lp_sidelined {
            &self.sidelined
        } else {
            &self.well_known
        };
        get(set).as_deref()
    }

    /// Queue for BSD-style commands when none was named: `$PRINTER`,
    /// else the configured default, else `lp`.
    pub fn default_destination_lpr(&self) -> String {
        std::env::var("PRINTER")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.default_dest_lpr.clone())
            .unwrap_or_else(|| "lp".to_string())
    }

    /// Queue for System V commands when none was named: `$LPDEST`,
    /// else the configured default, else `lp`.
    pub fn default_destination_lp(&self) -> String {
        std::env::var("LPDEST")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.default_dest_lp.clone())
            .unwrap_or_else(|| "lp".to_string())
    }
}

/// The permissive true-or-false reader the historical configuration
/// files use.
pub fn parse_torf(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "t" | "y" | "1" => Some(true),
        "false" | "no" | "f" | "n" | "0" => Some(false),
        _ => None,
    }
}
