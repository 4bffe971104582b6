// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Maximum field lengths for RFC 1179 control-file lines.  Values the RFC
// leaves open use the limits BSD lpd implementations settled on.  Encoders
// truncate to these lengths rather than reject.

/// Queue name in a job-submission command line.
pub const MAX_QUEUE: usize = 31;
/// `P` line, responsible user.
pub const MAX_P: usize = 31;
/// `C` line, job class.
pub const MAX_C: usize = 31;
/// `H` line, submitting host.
pub const MAX_H: usize = 31;
/// `J` line, job name.
pub const MAX_J: usize = 99;
/// `L` line, banner user.
pub const MAX_L: usize = 31;
/// `M` line, mail-to user.
pub const MAX_M: usize = 31;
/// `N` line, origin file name.
pub const MAX_N: usize = 131;
/// `T` line, title for pr.
pub const MAX_T: usize = 79;
/// `I` line, indent columns.
pub const MAX_I: usize = 8;
/// `W` line, page width.
pub const MAX_W: usize = 8;
/// `1`..`4` lines, troff font files.
pub const MAX_TROFF: usize = 131;

/// `<`, `>`, `O`, `K` lines of the DEC OSF extension family.
pub const MAX_DEC: usize = 31;

// Solaris extension family.
pub const MAX_5F: usize = 31;
pub const MAX_5H: usize = 31;
/// Solaris reuses `O` for lp interface options.
pub const MAX_O: usize = 131;
pub const MAX_5P: usize = 131;
pub const MAX_5S: usize = 31;
pub const MAX_5T: usize = 31;
pub const MAX_5Y: usize = 131;

// PPR extension family (`8PPR` lines).
pub const MAX_RESPONDER: usize = 16;
pub const MAX_RESPONDER_ADDRESS: usize = 128;
pub const MAX_RESPONDER_OPTIONS: usize = 128;

/// Most data files one job may carry.
pub const MAX_FILES_PER_JOB: usize = 100;

/// Longest queue name the PPR spooler itself accepts.  Tighter than
/// [`MAX_QUEUE`]; checked before shelling out to `ppop`.
pub const MAX_PPR_DESTNAME: usize = 16;

/// Truncate `value` to at most `max` bytes, the way the C encoders'
/// `%.*s` conversions did.  Multi-byte characters are cut at a char
/// boundary at or below the limit.
pub fn clip(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_leaves_short_values_alone() {
        assert_eq!(clip("lp0", MAX_QUEUE), "lp0");
    }

    #[test]
    fn clip_truncates_at_limit() {
        let long = "x".repeat(40);
        assert_eq!(clip(&long, MAX_P).len(), MAX_P);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        // 2-byte characters; a byte limit of 5 must back off to 4.
        let s = "ééé";
        assert_eq!(clip(s, 5), "éé");
    }
}
