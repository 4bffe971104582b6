// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PrintJob -> argument list for a System V `lp` command.

use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};

/// Longest value accepted for a numeric-ish -o option, counting the
/// option name itself.
const OPTION_SCRATCH: usize = 16;

fn o_opt(args: &mut Vec<String>, name: &str, value: Option<&str>) -> Result<()> {
    if let Some(value) = value {
        if value.len() > OPTION_SCRATCH - name.len() {
            return Err(SpoolError::BadArgument(format!(
                "{name} specifier too long"
            )));
        }
        args.push("-o".into());
        args.push(format!("{name}={value}"));
    }
    Ok(())
}

/// Build the argument list for submitting `job` through lp.
///
/// The System V attribute block passes through verbatim; unlike the
/// other backends nothing is parsed out of it, since lp is the native
/// consumer of those options.
pub fn build(job: &PrintJob) -> Result<Vec<String>> {
    let Some(dest) = job.dest.clone() else {
        return Err(SpoolError::NoDestination);
    };

    let mut args: Vec<String> = vec!["-d".into(), dest];

    // lp chatters about the job id unless told not to.
    if !job.show_jobid {
        args.push("-s".into());
    }

    if let Some(copies) = job.copies {
        args.push("-n".into());
        args.push(copies.to_string());
    }

    if let Some(name) = job.jobname.as_deref() {
        args.push("-t".into());
        args.push(name.to_string());
    }

    if let Some(priority) = job.priority {
        if priority > 39 {
            return Err(SpoolError::BadArgument(format!(
                "priority {priority} is out of range 0 to 39"
            )));
        }
        args.push("-q".into());
        args.push(priority.to_string());
    }

    if job.notify_write {
        args.push("-w".into());
    }
    if job.notify_email {
        args.push("-m".into());
    }

    if job.nobanner {
        args.push("-o".into());
        args.push("nobanner".into());
    }
    if !job.filebreak {
        args.push("-o".into());
        args.push("nofilebreak".into());
    }

    o_opt(&mut args, "width", job.width.as_deref())?;
    o_opt(&mut args, "length", job.length.as_deref())?;
    o_opt(&mut args, "cpi", job.cpi.as_deref())?;
    o_opt(&mut args, "lpi", job.lpi.as_deref())?;

    if let Some(options) = job.lp_interface_options.as_deref() {
        args.push("-o".into());
        args.push(options.to_string());
    }

    if let Some(modes) = job.lp_filter_modes.as_deref() {
        args.push("-y".into());
        args.push(modes.to_string());
    }

    if let Some(charset) = job.charset.as_deref() {
        args.push("-S".into());
        args.push(charset.to_string());
    }

    if let Some(form) = job.form.as_deref() {
        args.push("-f".into());
        args.push(form.to_string());
    }

    if let Some(pages) = job.lp_pagelist.as_deref() {
        args.push("-P".into());
        args.push(pages.to_string());
    }

    if let Some(handling) = job.lp_handling.as_deref() {
        args.push("-H".into());
        args.push(handling.to_string());
    }

    // "-r" is the raw sentinel, a switch rather than a type name.
    match job.content_type_lp() {
        Some("-r") => args.push("-r".into()),
        Some(name) => {
            args.push("-T".into());
            args.push(name.to_string());
        }
        None => {}
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> PrintJob {
        let mut job = PrintJob::new();
        job.dest = Some("laser3".into());
        job
    }

    #[test]
    fn quiet_mode_is_the_default() {
        assert_eq!(build(&job()).unwrap(), vec!["-d", "laser3", "-s"]);

        let mut j = job();
        j.show_jobid = true;
        assert_eq!(build(&j).unwrap(), vec!["-d", "laser3"]);
    }

    #[test]
    fn zero_copies_is_still_an_explicit_request() {
        let mut j = job();
        j.copies = Some(0);
        let args = build(&j).unwrap();
        let at = args.iter().position(|a| a == "-n").unwrap();
        assert_eq!(args[at + 1], "0");
    }

    #[test]
    fn priority_has_the_lp_range() {
        let mut j = job();
        j.priority = Some(39);
        let args = build(&j).unwrap();
        let at = args.iter().position(|a| a == "-q").unwrap();
        assert_eq!(args[at + 1], "39");

        j.priority = Some(40);
        let err = build(&j).unwrap_err();
        assert!(err.to_string().contains("out of range 0 to 39"));
    }

    #[test]
    fn generic_fields_render_as_o_options() {
        let mut j = job();
        j.nobanner = true;
        j.filebreak = false;
        j.width = Some("132".into());
        j.lpi = Some("8".into());
        let args = build(&j).unwrap();
        let rendered: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-o")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(rendered, vec!["nobanner", "nofilebreak", "width=132", "lpi=8"]);
    }

    #[test]
    fn oversized_o_option_values_are_rejected() {
        let mut j = job();
        j.width = Some("123456789012".into());
        let err = build(&j).unwrap_err();
        assert!(err.to_string().contains("width specifier too long"));
    }

    #[test]
    fn attribute_block_passes_through_verbatim() {
        let mut j = job();
        j.lp_interface_options = Some("nobanner width=80".into());
        j.lp_filter_modes = Some("landscape".into());
        j.charset = Some("usascii".into());
        j.form = Some("invoice".into());
        j.lp_pagelist = Some("2-5".into());
        j.lp_handling = Some("hold".into());
        let args = build(&j).unwrap();
        for (flag, value) in [
            ("-o", "nobanner width=80"),
            ("-y", "landscape"),
            ("-S", "usascii"),
            ("-f", "invoice"),
            ("-P", "2-5"),
            ("-H", "hold"),
        ] {
            assert!(
                args.windows(2).any(|w| w[0] == flag && w[1] == value),
                "{flag} {value}"
            );
        }
        // Passing through means no folding into generic fields.
        assert!(!args.iter().any(|a| a == "nobanner"));
    }

    #[test]
    fn content_type_derives_from_the_lpr_letter() {
        let mut j = job();
        j.content_type_lpr = Some('n');
        let args = build(&j).unwrap();
        let at = args.iter().position(|a| a == "-T").unwrap();
        assert_eq!(args[at + 1], "troff");

        // The raw sentinel is a bare switch.
        let mut j = job();
        j.content_type_lpr = Some('x');
        let args = build(&j).unwrap();
        assert!(args.contains(&"-r".to_string()));
        assert!(!args.contains(&"-T".to_string()));
    }
}
