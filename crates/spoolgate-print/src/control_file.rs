// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RFC 1179 control-file codec.  The control file is the tagged-line
// manifest an lpr client sends ahead of its data files: one attribute per
// line, the first character selecting the field, the rest being the value.
// Vendor extensions (DEC OSF, Solaris, PPR) ride along as extra tags and
// are only emitted when the remote-queue entry says the peer understands
// them.

use tracing::debug;

use spoolgate_core::limits::{self, clip};
use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};
use spoolgate_resolve::RemoteDestination;

/// Hard cap on an encoded control file.  Historical lpd servers receive
/// into a fixed buffer of this size; exceeding it would kill the job at
/// the far end anyway, so the encoder rejects it here.
pub const MAX_CONTROL_FILE: usize = 10_000;

/// How many leading characters of a data-file name the decoder considers
/// when deciding whether a repeated type line means another copy.
const NAME_CONSIDER: usize = 40;

/// Name of the control file for a job, e.g. `cfA007darkstar`.
pub fn control_file_name(queue_id: u32, node: &str) -> String {
    format!("cfA{queue_id:03}{node}")
}

/// Name of the `index`th data file of a job, e.g. `dfA007.000darkstar`.
pub fn data_file_name(queue_id: u32, index: usize, node: &str) -> String {
    format!("dfA{queue_id:03}.{index:03}{node}")
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Render a job as a control file destined for `dest`.
///
/// Fields longer than their tag's limit are truncated, never rejected.
/// When the peer lacks Solaris extensions the System V attribute block
/// cannot travel, so its interface options are first folded into the
/// portable width/length/banner fields.
pub fn encode(
    job: &mut PrintJob,
    queue_id: u32,
    node: &str,
    dest: &RemoteDestination,
) -> Result<String> {
    if !dest.solaris_extensions {
        job.parse_lp_interface_options();
        job.parse_lp_filter_modes();
    }

    // Unknown content defaults to "formatted file".
    let file_type = job.content_type_lpr().unwrap_or('f');
    let copies = job.copies.unwrap_or(1);
    let user = job.user.clone().unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!(
        "H{}\nP{}\n",
        clip(node, limits::MAX_H),
        clip(&user, limits::MAX_P)
    ));

    if job.notify_email {
        let mailto = job.mailto.as_deref().unwrap_or(&user);
        out.push_str(&format!("M{}\n", clip(mailto, limits::MAX_M)));
    }

    if !job.nobanner {
        let class = job.lpr_class.as_deref().unwrap_or(node);
        let jobname = match job.jobname.as_deref() {
            Some(name) => name,
            None => match job.files.first().map(String::as_str) {
                None | Some("-") => "stdin",
                Some(path) => basename(path),
            },
        };
        out.push_str(&format!(
            "J{}\nC{}\nL{}\n",
            clip(jobname, limits::MAX_J),
            clip(class, limits::MAX_C),
            clip(&user, limits::MAX_L)
        ));
    }

    if file_type == 'p' {
        if let Some(title) = job.pr_title.as_deref() {
            out.push_str(&format!("T{}\n", clip(title, limits::MAX_T)));
        }
    }
    if let Some(width) = job.width.as_deref() {
        out.push_str(&format!("W{}\n", clip(width, limits::MAX_W)));
    }
    if let Some(indent) = job.indent.as_deref() {
        out.push_str(&format!("I{}\n", clip(indent, limits::MAX_I)));
    }

    if file_type == 't' || file_type == 'n' {
        for (slot, font) in job.troff_fonts.iter().enumerate() {
            if let Some(font) = font.as_deref() {
                out.push_str(&format!("{}{}\n", slot + 1, clip(font, limits::MAX_TROFF)));
            }
        }
    }

    if dest.osf_extensions {
        if let Some(tray) = job.osf_input_tray.as_deref() {
            out.push_str(&format!("<{}\n", clip(tray, limits::MAX_DEC)));
        }
        if let Some(tray) = job.osf_output_tray.as_deref() {
            out.push_str(&format!(">{}\n", clip(tray, limits::MAX_DEC)));
        }
        if let Some(orientation) = job.osf_orientation.as_deref() {
            out.push_str(&format!("O{}\n", clip(orientation, limits::MAX_DEC)));
        }
        if let Some(duplex) = job.osf_duplex.as_deref() {
            out.push_str(&format!("K{}\n", clip(duplex, limits::MAX_DEC)));
        }
        if job.nup > 0 {
            out.push_str(&format!("G{}\n", job.nup));
        }
    }

    if dest.solaris_extensions {
        if let Some(form) = job.form.as_deref() {
            out.push_str(&format!("5f{}\n", clip(form, limits::MAX_5F)));
        }
        if let Some(options) = job.lp_interface_options.as_deref() {
            out.push_str(&format!("O{}\n", clip(options, limits::MAX_O)));
        }
        if let Some(modes) = job.lp_filter_modes.as_deref() {
            out.push_str(&format!("5y{}\n", clip(modes, limits::MAX_5Y)));
        }
        if let Some(pages) = job.lp_pagelist.as_deref() {
            out.push_str(&format!("5P{}\n", clip(pages, limits::MAX_5P)));
        }
        if let Some(charset) = job.charset.as_deref() {
            out.push_str(&format!("5S{}\n", clip(charset, limits::MAX_5S)));
        }
        if let Some(kind) = job.content_type_lp.as_deref() {
            out.push_str(&format!("5T{}\n", clip(kind, limits::MAX_5T)));
        }
    }

    if dest.ppr_extensions {
        // The address must name a host; a bare username would be
        // meaningless once the job leaves this machine.
        if let (Some(responder), Some(address)) =
            (job.responder.as_deref(), job.responder_address.as_deref())
        {
            if address.contains('@') {
                out.push_str(&format!(
                    "8PPR --responder {}\n8PPR --responder-address {}\n",
                    clip(responder, limits::MAX_RESPONDER),
                    clip(address, limits::MAX_RESPONDER_ADDRESS)
                ));
                if let Some(options) = job.responder_options.as_deref() {
                    out.push_str(&format!(
                        "8PPR --responder-options {}\n",
                        clip(options, limits::MAX_RESPONDER_OPTIONS)
                    ));
                }
            }
        }
    }

    // One run of type lines per copy, then the origin name and the
    // unlink instruction, for each data file.
    for (index, path) in job.files.iter().enumerate() {
        let filename = if path == "-" { "" } else { path.as_str() };
        let df = data_file_name(queue_id, index, node);
        let projected =
            out.len() + (df.len() + 2) * copies as usize + filename.len() + df.len() + 4;
        if projected > MAX_CONTROL_FILE {
            return Err(SpoolError::BadArgument(format!(
                "control file would exceed {MAX_CONTROL_FILE} bytes"
            )));
        }
        for _ in 0..copies {
            out.push(file_type);
            out.push_str(&df);
            out.push('\n');
        }
        out.push_str(&format!("N{filename}\nU{df}\n"));
    }

    Ok(out)
}

/// One distinct data file named by the control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSpec {
    /// Content-type letter from the tag.
    pub file_type: char,
    /// Consecutive identical type lines collapse into this count.
    pub copies: u32,
}

/// Everything a received control file said.
///
/// `names` and `files` run on independent counters the way the tag lines
/// do; well-formed control files keep them in step so entry `i` of each
/// describes the `i`th data file.
#[derive(Debug, Default)]
pub struct ControlFileInfo {
    pub job: PrintJob,
    /// Origin filenames from `N` lines, in arrival order.
    pub names: Vec<String>,
    /// Type and copy count per distinct data file.
    pub files: Vec<FileSpec>,
    /// Count of `Ud…` unlink lines; a job is complete when this many
    /// data files have arrived.
    pub unlink_lines: usize,
}

/// atoi()-style integer scan: skip space, take leading digits, ignore
/// trailing junk, treat anything unusable as zero.
pub(crate) fn leading_int(s: &str) -> u32 {
    let t = s.trim_start();
    let t = match t.strip_prefix('-') {
        Some(_) => return 0,
        None => t.strip_prefix('+').unwrap_or(t),
    };
    let end = t
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(t.len());
    t[..end].parse().unwrap_or(0)
}

fn solaris_option(job: &mut PrintJob, option: &str) {
    let mut chars = option.chars();
    let Some(selector) = chars.next() else {
        return;
    };
    let value = chars.as_str().to_string();
    match selector {
        'f' => job.form = Some(value),
        'H' => job.lp_handling = Some(value),
        'O' => job.lp_interface_options = Some(value),
        'P' => job.lp_pagelist = Some(value),
        'S' => job.charset = Some(value),
        'T' => job.content_type_lp = Some(value),
        'y' => job.lp_filter_modes = Some(value),
        _ => {}
    }
}

fn ppr_option(job: &mut PrintJob, option: &str) {
    if let Some(v) = option.strip_prefix("--responder ") {
        job.responder = Some(v.to_string());
    } else if let Some(v) = option.strip_prefix("--responder-address ") {
        job.responder_address = Some(v.to_string());
    } else if let Some(v) = option.strip_prefix("--responder-options ") {
        job.responder_options = Some(v.to_string());
    }
}

/// Parse a received control file.
///
/// Unknown tags are ignored without complaint; lpd clients disagree far
/// too much for strictness to survive contact with them.
pub fn decode(text: &str) -> ControlFileInfo {
    let mut info = ControlFileInfo::default();

    // No L line means suppress the banner page.
    info.job.nobanner = true;

    let mut last_name = String::new();

    for line in text.split(['\n', '\r']).filter(|l| !l.is_empty()) {
        let mut chars = line.chars();
        let Some(tag) = chars.next() else {
            continue;
        };
        let value = chars.as_str();

        match tag {
            'P' => info.job.user = Some(value.to_string()),
            'H' => info.job.from_host = Some(value.to_string()),
            'C' => info.job.lpr_class = Some(value.to_string()),
            'I' => info.job.indent = Some(value.to_string()),
            'J' => info.job.jobname = Some(value.to_string()),
            'L' => info.job.nobanner = false,
            'M' => {
                info.job.mailto = Some(value.to_string());
                info.job.notify_email = true;
            }
            'N' => {
                if info.names.len() < limits::MAX_FILES_PER_JOB {
                    // Some lpr clients send a lone space for stdin.
                    if value == " " {
                        info.names.push("standard input".to_string());
                    } else {
                        info.names.push(value.to_string());
                    }
                }
            }
            'T' => info.job.pr_title = Some(value.to_string()),
            'W' => info.job.width = Some(value.to_string()),
            'U' => {
                // lpr's -r switch plants spurious U lines naming the
                // original file; only df names count toward completion.
                if value.starts_with('d') {
                    info.unlink_lines += 1;
                }
            }
            '1' => info.job.troff_fonts[0] = Some(value.to_string()),
            '2' => info.job.troff_fonts[1] = Some(value.to_string()),
            '3' => info.job.troff_fonts[2] = Some(value.to_string()),
            '4' => info.job.troff_fonts[3] = Some(value.to_string()),
            '5' => solaris_option(&mut info.job, value),
            '8' => {
                if let Some(option) = line.strip_prefix("8PPR ") {
                    ppr_option(&mut info.job, option);
                }
            }
            '<' => info.job.osf_input_tray = Some(value.to_string()),
            'K' => info.job.osf_duplex = Some(value.to_string()),
            'G' => info.job.nup = leading_int(value),
            '>' => info.job.osf_output_tray = Some(value.to_string()),
            'O' => {
                if value == "landscape" || value == "portrait" {
                    info.job.osf_orientation = Some(value.to_string());
                } else {
                    // Solaris reuses O for lp interface options; hand
                    // the whole line back so the selector is the tag.
                    solaris_option(&mut info.job, line);
                }
            }
            'f' | 'l' | 'o' | 'p' | 'r' | 'c' | 'g' | 'v' | 'n' | 'd' | 't' | 'x' => {
                if value.starts_with('/') {
                    // Absolute path: another -r artifact, not a data file.
                    continue;
                }
                let head = clip(value, NAME_CONSIDER);
                if head == last_name && !info.files.is_empty() {
                    if let Some(last) = info.files.last_mut() {
                        last.copies += 1;
                    }
                } else if info.files.len() < limits::MAX_FILES_PER_JOB {
                    info.files.push(FileSpec {
                        file_type: tag,
                        copies: 1,
                    });
                    last_name = head.to_string();
                } else {
                    debug!("no room for file");
                }
            }
            _ => {}
        }
    }

    info
}
