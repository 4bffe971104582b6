// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PrintJob -> argument list for a BSD `lpr` command.

use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};

/// Build the argument list for submitting `job` through lpr.
///
/// File names are not included; the caller appends them.  lpr runs as
/// the submitting user, so no username argument is passed either.
pub fn build(job: &mut PrintJob) -> Result<Vec<String>> {
    let Some(dest) = job.dest.clone() else {
        return Err(SpoolError::NoDestination);
    };

    // Fold System V -o and -y options into the generic fields.
    job.parse_lp_interface_options();
    job.parse_lp_filter_modes();

    let mut args: Vec<String> = vec!["-P".into(), dest];

    if let Some(name) = job.jobname.as_deref() {
        args.push("-J".into());
        args.push(name.to_string());
    }

    if let Some(class) = job.lpr_class.as_deref() {
        args.push("-C".into());
        args.push(class.to_string());
    }

    // The content type is a one-letter switch of its own, e.g. -o for
    // PostScript, -n for troff output.
    if let Some(code) = job.content_type_lpr() {
        args.push(format!("-{code}"));
    }

    if let Some(title) = job.pr_title.as_deref() {
        args.push("-T".into());
        args.push(title.to_string());
    }

    if let Some(width) = job.width.as_deref() {
        args.push("-w".into());
        args.push(width.to_string());
    }

    if let Some(indent) = job.indent.as_deref() {
        args.push("-i".into());
        args.push(indent.to_string());
    }

    for (slot, font) in job.troff_fonts.iter().enumerate() {
        if let Some(font) = font.as_deref() {
            args.push(format!("-{}", slot + 1));
            args.push(font.to_string());
        }
    }

    if let Some(copies) = job.copies {
        if copies > 0 {
            args.push("-#".into());
            args.push(copies.to_string());
        }
    }

    if job.nobanner {
        args.push("-h".into());
    }

    if job.notify_email {
        args.push("-m".into());
    }

    if job.unlink_after {
        args.push("-r".into());
    }

    if !job.immediate_copy {
        args.push("-s".into());
    }

    // DEC OSF/1 3.2 extensions.  Raw keywords pass straight through;
    // lpr does its own validation.
    if let Some(tray) = job.osf_input_tray.as_deref() {
        args.push("-<".into());
        args.push(tray.to_string());
    }
    if let Some(tray) = job.osf_output_tray.as_deref() {
        args.push("->".into());
        args.push(tray.to_string());
    }
    if let Some(orientation) = job.osf_orientation.as_deref() {
        args.push("-O".into());
        args.push(orientation.to_string());
    }
    if let Some(duplex) = job.osf_duplex.as_deref() {
        args.push("-K".into());
        args.push(duplex.to_string());
    }
    if job.nup > 0 {
        if job.nup > 999 {
            return Err(SpoolError::BadArgument("nup specifier too long".into()));
        }
        args.push("-N".into());
        args.push(job.nup.to_string());
    }

    Ok(args)
}
