// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolgate print gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoolError};

/// Which local spooler family a queue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpoolerKind {
    /// The PPR spooler.
    Ppr,
    /// BSD lpr/lpd.
    Bsd,
    /// System V lp.
    Sysv,
}

impl SpoolerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ppr => "ppr",
            Self::Bsd => "bsd",
            Self::Sysv => "sysv",
        }
    }
}

/// Duplex modes of the DEC OSF `-K` extension.
///
/// The last three are the odd ones: they ask for margins and gutters
/// formatted for one mode while the engine actually prints in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplexMode {
    One,
    Two,
    Tumble,
    OneSidedDuplex,
    OneSidedTumble,
    TwoSidedSimplex,
}

impl DuplexMode {
    /// Parse the keyword as it appears after `-K` or in a `K` control
    /// line.  Unknown keywords are not an error for callers that pass
    /// the raw value through; they return `None`.
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "one" => Some(Self::One),
            "two" => Some(Self::Two),
            "tumble" => Some(Self::Tumble),
            "one_sided_duplex" => Some(Self::OneSidedDuplex),
            "one_sided_tumble" => Some(Self::OneSidedTumble),
            "two_sided_simplex" => Some(Self::TwoSidedSimplex),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::One => "one",
            Self::Two => "two",
            Self::Tumble => "tumble",
            Self::OneSidedDuplex => "one_sided_duplex",
            Self::OneSidedTumble => "one_sided_tumble",
            Self::TwoSidedSimplex => "two_sided_simplex",
        }
    }

    /// The `-o duplex=` filter hint and `-F` PPD override the PPR
    /// spooler needs for this mode.  The pairing matters: a wrong
    /// override prints the right way up but with the wrong gutters.
    pub fn ppr_pair(&self) -> (&'static str, &'static str) {
        match self {
            Self::One => ("none", "*Duplex None"),
            Self::Two => ("notumble", "*Duplex DuplexNoTumble"),
            Self::Tumble => ("tumble", "*Duplex DuplexTumble"),
            Self::OneSidedDuplex => ("notumble", "*Duplex None"),
            Self::OneSidedTumble => ("tumble", "*Duplex None"),
            Self::TwoSidedSimplex => ("none", "*Duplex Duplex"),
        }
    }
}

/// A backend-neutral print request.
///
/// One of these is built per submission, either by a front-end command
/// or by the server's control-file decoder, then rendered once into a
/// backend argv or a control file.  Optional fields stay `None` when the
/// caller never set them; the renderers emit nothing for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    // Who is printing and on whose behalf.
    pub user: Option<String>,
    pub uid: u32,
    pub gid: u32,
    pub from_host: Option<String>,
    /// "Acting for" class of a relayed job, usually the client hostname.
    pub proxy_class: Option<String>,
    /// How PPR should describe the submitter: `$user@$host`,
    /// `$user@$proxyclass`, or anything else for a bare username.
    pub from_format: Option<String>,

    // What to print and where.
    pub dest: Option<String>,
    /// Input paths; `-` means stdin, an empty list defaults to stdin.
    pub files: Vec<String>,

    // Rendering options.
    pub copies: Option<u32>,
    pub banner: bool,
    pub nobanner: bool,
    pub filebreak: bool,
    pub priority: Option<u8>,
    /// Copy into the queue now rather than spool by reference.
    pub immediate_copy: bool,
    /// BSD single-letter content code, e.g. `f`, `o`, `n`.
    pub content_type_lpr: Option<char>,
    /// System V content type name, e.g. `simple`, `postscript`.
    pub content_type_lp: Option<String>,
    pub jobname: Option<String>,
    pub lpr_class: Option<String>,
    pub pr_title: Option<String>,
    pub width: Option<String>,
    pub length: Option<String>,
    pub indent: Option<String>,
    pub cpi: Option<String>,
    pub lpi: Option<String>,
    /// Troff font files for the `1`..`4` control lines.
    pub troff_fonts: [Option<String>; 4],

    // System V lp attribute block, passed through verbatim to lp or a
    // Solaris-extension peer, parsed locally otherwise.
    pub form: Option<String>,
    pub charset: Option<String>,
    pub lp_interface_options: Option<String>,
    pub lp_filter_modes: Option<String>,
    pub lp_pagelist: Option<String>,
    pub lp_handling: Option<String>,

    // DEC OSF extension block.
    pub osf_input_tray: Option<String>,
    pub osf_output_tray: Option<String>,
    pub osf_orientation: Option<String>,
    /// Raw duplex keyword; see [`DuplexMode::parse`].
    pub osf_duplex: Option<String>,
    /// Pages per sheet, 0 meaning unset.
    pub nup: u32,

    // PPR responder extension block.
    pub responder: Option<String>,
    pub responder_address: Option<String>,
    pub responder_options: Option<String>,

    // Notification and disposition.
    pub unlink_after: bool,
    pub show_jobid: bool,
    pub notify_email: bool,
    pub notify_write: bool,
    pub mailto: Option<String>,
    pub mailto_host: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl PrintJob {
    pub fn new() -> Self {
        Self {
            user: None,
            uid: 0,
            gid: 0,
            from_host: None,
            proxy_class: None,
            from_format: None,
            dest: None,
            files: Vec::new(),
            copies: None,
            banner: false,
            nobanner: false,
            filebreak: true,
            priority: None,
            immediate_copy: true,
            content_type_lpr: None,
            content_type_lp: None,
            jobname: None,
            lpr_class: None,
            pr_title: None,
            width: None,
            length: None,
            indent: None,
            cpi: None,
            lpi: None,
            troff_fonts: [None, None, None, None],
            form: None,
            charset: None,
            lp_interface_options: None,
            lp_filter_modes: None,
            lp_pagelist: None,
            lp_handling: None,
            osf_input_tray: None,
            osf_output_tray: None,
            osf_orientation: None,
            osf_duplex: None,
            nup: 0,
            responder: None,
            responder_address: None,
            responder_options: None,
            unlink_after: false,
            show_jobid: false,
            notify_email: false,
            notify_write: false,
            mailto: None,
            mailto_host: None,
            created_at: Utc::now(),
        }
    }

    /// BSD content-type letter, deriving from the lp name via the
    /// translation table when only that was set.  An explicitly set
    /// letter always wins.
    pub fn content_type_lpr(&self) -> Option<char> {
        if let Some(c) = self.content_type_lpr {
            return Some(c);
        }
        self.content_type_lp
            .as_deref()
            .and_then(crate::xlate::lp_to_lpr)
    }

    /// System V content-type name, deriving from the lpr letter via the
    /// translation table when only that was set.
    pub fn content_type_lp(&self) -> Option<&str> {
        if let Some(name) = self.content_type_lp.as_deref() {
            return Some(name);
        }
        self.content_type_lpr.and_then(crate::xlate::lpr_to_lp)
    }

    /// Pull width/length/lpi/cpi and the banner flags out of a System V
    /// `-o` option list so non-SysV backends can render them natively.
    /// Unrecognized tokens and `stty=` settings are ignored.
    pub fn parse_lp_interface_options(&mut self) {
        let Some(options) = self.lp_interface_options.clone() else {
            return;
        };
        for token in options.split([' ', '\t']).filter(|t| !t.is_empty()) {
            if token == "nobanner" {
                self.nobanner = true;
            } else if token == "nofilebreak" {
                self.filebreak = false;
            } else if let Some(v) = token.strip_prefix("length=") {
                self.length = Some(v.to_string());
            } else if let Some(v) = token.strip_prefix("width=") {
                self.width = Some(v.to_string());
            } else if let Some(v) = token.strip_prefix("lpi=") {
                self.lpi = Some(v.to_string());
            } else if let Some(v) = token.strip_prefix("cpi=") {
                self.cpi = Some(v.to_string());
            }
        }
    }

    /// The `-y` mode list carries nothing the generic model understands;
    /// scanning it is kept for symmetry with the interface options.
    pub fn parse_lp_filter_modes(&mut self) {}

    /// Check the invariants every submission path relies on.
    pub fn validate_for_submission(&self) -> Result<()> {
        if self.dest.is_none() {
            return Err(SpoolError::NoDestination);
        }
        if self.user.as_deref().is_none_or(str::is_empty) {
            return Err(SpoolError::BadArgument("user not set".into()));
        }
        if let Some(copies) = self.copies {
            if copies > 9999 {
                return Err(SpoolError::BadArgument(format!(
                    "copies {copies} out of range 0 to 9999"
                )));
            }
        }
        if let Some(name) = self.jobname.as_deref() {
            if name.is_empty() {
                return Err(SpoolError::BadArgument("empty job name".into()));
            }
        }
        Ok(())
    }
}

impl Default for PrintJob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplex_keywords_round_trip() {
        for mode in [
            DuplexMode::One,
            DuplexMode::Two,
            DuplexMode::Tumble,
            DuplexMode::OneSidedDuplex,
            DuplexMode::OneSidedTumble,
            DuplexMode::TwoSidedSimplex,
        ] {
            assert_eq!(DuplexMode::parse(mode.keyword()), Some(mode));
        }
        assert_eq!(DuplexMode::parse("sideways"), None);
    }

    #[test]
    fn explicit_lpr_type_wins_over_derived() {
        let mut job = PrintJob::new();
        job.content_type_lp = Some("postscript".into());
        assert_eq!(job.content_type_lpr(), Some('o'));
        job.content_type_lpr = Some('f');
        assert_eq!(job.content_type_lpr(), Some('f'));
    }

    #[test]
    fn interface_options_fill_generic_fields() {
        let mut job = PrintJob::new();
        job.lp_interface_options = Some("nobanner width=80 lpi=6 stty=raw".into());
        job.parse_lp_interface_options();
        assert!(job.nobanner);
        assert_eq!(job.width.as_deref(), Some("80"));
        assert_eq!(job.lpi.as_deref(), Some("6"));
        assert!(job.filebreak);
    }

    #[test]
    fn submission_requires_dest_and_user() {
        let mut job = PrintJob::new();
        assert!(matches!(
            job.validate_for_submission(),
            Err(SpoolError::NoDestination)
        ));
        job.dest = Some("lp0".into());
        assert!(job.validate_for_submission().is_err());
        job.user = Some("alice".into());
        assert!(job.validate_for_submission().is_ok());
    }
}
