// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PrintJob -> argument list for PPR's `ppr` submission command.

use spoolgate_core::limits::{self, clip};
use spoolgate_core::types::{DuplexMode, PrintJob};
use spoolgate_core::{Result, SpoolError};

use crate::control_file::leading_int;

/// ppr's `-T` name for the job's content, if it needs one.
///
/// Only the explicitly set fields are consulted; formatted text and
/// control-code passthrough submit untyped and let ppr sniff the file.
pub fn content_type_ppr(job: &PrintJob) -> Option<&'static str> {
    if let Some(code) = job.content_type_lpr {
        return match code {
            'c' => Some("cif"),
            'd' => Some("dvi"),
            'g' => Some("plot"),
            'n' => Some("troff"),
            'p' => Some("pr"),
            't' => Some("cat4"),
            'v' => Some("sunras"),
            'o' => Some("postscript"),
            _ => None,
        };
    }
    match job.content_type_lp.as_deref() {
        Some("postscript") => Some("postscript"),
        _ => None,
    }
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

/// Build the argument list for submitting `job` through ppr.
///
/// The file names are not included; the caller appends them (or pipes
/// stdin) according to how it runs the command.
pub fn build(job: &mut PrintJob) -> Result<Vec<String>> {
    let Some(dest) = job.dest.clone() else {
        return Err(SpoolError::NoDestination);
    };
    let Some(user) = job.user.clone() else {
        return Err(SpoolError::BadArgument("user not set".into()));
    };

    // Fold System V -o options into the fields rendered below.
    job.parse_lp_interface_options();
    job.parse_lp_filter_modes();

    // -u makes queue listings show usernames the way lpr's do.
    let mut args: Vec<String> = vec!["-d".into(), dest, "-u".into(), "yes".into()];

    let submitted_for = match job.from_format.as_deref() {
        Some("$user@$host") => {
            format!("{user}@{}", job.from_host.as_deref().unwrap_or("<missing>"))
        }
        Some("$user@$proxyclass") => {
            format!("{user}@{}", job.proxy_class.as_deref().unwrap_or("<missing>"))
        }
        _ => user.clone(),
    };
    args.push("-f".into());
    args.push(submitted_for);

    // Notification address.  Some mail systems choke on user@localhost,
    // so that host is left off.
    let mailhost = job
        .mailto_host
        .as_deref()
        .or(job.from_host.as_deref())
        .filter(|h| *h != "localhost");
    let mailaddr = match mailhost {
        Some(host) => format!("{}@{host}", job.mailto.as_deref().unwrap_or(&user)),
        None => job.mailto.clone().unwrap_or_else(|| user.clone()),
    };

    if let Some(responder) = job.responder.as_deref() {
        args.push("--responder".into());
        args.push(responder.to_string());
        if let Some(address) = job.responder_address.as_deref() {
            args.push("--responder-address".into());
            args.push(address.to_string());
        }
        if let Some(options) = job.responder_options.as_deref() {
            args.push("--responder-options".into());
            args.push(options.to_string());
        }
    } else if job.notify_email {
        args.extend(["-m".into(), "mail".into(), "-r".into(), mailaddr]);
    } else if job.notify_write {
        args.extend(["-m".into(), "write".into(), "-r".into(), user.clone()]);
    } else {
        // Nobody asked for notification; arrange a mail report for
        // failures only.
        args.extend([
            "-m".into(),
            "mail".into(),
            "-r".into(),
            mailaddr,
            "--responder-options".into(),
            "printed=no".into(),
        ]);
    }

    // Error messages go through the responder too.
    args.push("-e".into());
    args.push("responder".into());

    if let Some(class) = job.proxy_class.as_deref() {
        args.push("-X".into());
        args.push(format!("{user}@{class}"));
    }

    if let Some(title) = job.jobname.as_deref() {
        args.push("--title".into());
        args.push(title.to_string());
    }

    if job.show_jobid {
        args.push("--show-jobid".into());
    }

    if let Some(copies) = job.copies {
        args.push("-n".into());
        args.push(copies.to_string());
    }

    if job.banner {
        args.push("-b".into());
        args.push("yes".into());
    }
    if job.nobanner {
        args.push("-b".into());
        args.push("no".into());
    }

    if let Some(w) = job.width.as_deref() {
        let width = leading_int(w);
        if width == 0 || width > 999 {
            return Err(SpoolError::BadArgument(format!("invalid width \"{w}\"")));
        }
        args.push("-o".into());
        args.push(format!("width={width}"));
    }

    if let Some(title) = job.pr_title.as_deref() {
        let mut escaped = String::new();
        for c in clip(title, limits::MAX_T).chars() {
            if c == '"' || c == '\\' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        args.push("-o".into());
        args.push(format!("title=\"{escaped}\""));
    }

    if let Some(tray) = job.osf_input_tray.as_deref() {
        args.push("-F".into());
        args.push(format!("*InputSlot {}", capitalize_first(tray)));
    }
    if let Some(tray) = job.osf_output_tray.as_deref() {
        args.push("-F".into());
        args.push(format!("*OutputBin {}", capitalize_first(tray)));
    }
    if let Some(orientation) = job.osf_orientation.as_deref() {
        args.push("-o".into());
        args.push(format!("orientation={}", orientation.to_ascii_lowercase()));
    }

    // Each duplex mode needs both the filter hint and the PPD override;
    // the -F covers filters that ignore duplex=, and for the mixed
    // modes it forces printing in the opposite mode from the margins.
    if let Some(keyword) = job.osf_duplex.as_deref() {
        if let Some(mode) = DuplexMode::parse(keyword) {
            let (hint, ppd) = mode.ppr_pair();
            args.push("-o".into());
            args.push(format!("duplex={hint}"));
            args.push("-F".into());
            args.push(ppd.to_string());
        }
    }

    // N-Up must come after the duplex pair: its duplex=undef has to win
    // so the filters do not put gutters on N-Up pages.
    if job.nup > 0 {
        if job.nup > 999 {
            return Err(SpoolError::BadArgument("nup specifier too long".into()));
        }
        args.push("-N".into());
        args.push(job.nup.to_string());
        args.push("-o".into());
        args.push("duplex=undef".into());
    }

    if let Some(pages) = job.lp_pagelist.as_deref() {
        args.push("--page-list".into());
        args.push(pages.to_string());
    }

    if job.lp_handling.as_deref() == Some("hold") {
        args.push("--hold".into());
    }

    if let Some(kind) = content_type_ppr(job) {
        args.push("-T".into());
        args.push(kind.to_string());
    }

    Ok(args)
}
