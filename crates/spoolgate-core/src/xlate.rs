// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Translation between System V lp content-type names and BSD lpr
// single-letter content codes.

/// The table, in the order the historical implementations carry it.
///
/// `l` (leave control codes) has no lp name; `x` is reachable only from
/// the lp side through the literal `-r` raw sentinel.
pub const LP_LPR_TYPE_XLATE: &[(Option<&str>, char)] = &[
    (Some("simple"), 'f'),
    (None, 'l'),
    (Some("pr"), 'p'),
    (Some("postscript"), 'o'),
    (Some("fortran"), 'r'),
    (Some("cif"), 'c'),
    (Some("plot"), 'g'),
    (Some("sunras"), 'v'),
    (Some("troff"), 'n'),
    (Some("dvi"), 'd'),
    (Some("otroff"), 't'),
    (Some("-r"), 'x'),
];

/// BSD letter for a System V type name, if the table knows it.
pub fn lp_to_lpr(name: &str) -> Option<char> {
    LP_LPR_TYPE_XLATE
        .iter()
        .find(|(lp, _)| *lp == Some(name))
        .map(|&(_, lpr)| lpr)
}

/// System V type name for a BSD letter, if the table knows it.
pub fn lpr_to_lp(code: char) -> Option<&'static str> {
    LP_LPR_TYPE_XLATE
        .iter()
        .find(|&&(_, lpr)| lpr == code)
        .and_then(|&(lp, _)| lp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_row_round_trips() {
        for &(lp, lpr) in LP_LPR_TYPE_XLATE {
            if let Some(name) = lp {
                assert_eq!(lp_to_lpr(name), Some(lpr));
                assert_eq!(lpr_to_lp(lpr), Some(name));
            }
        }
    }

    #[test]
    fn nameless_letter_derives_nothing() {
        assert_eq!(lpr_to_lp('l'), None);
    }

    #[test]
    fn unknown_values_derive_nothing() {
        assert_eq!(lp_to_lpr("banner"), None);
        assert_eq!(lpr_to_lp('z'), None);
    }

    #[test]
    fn raw_sentinel_maps_both_ways() {
        assert_eq!(lp_to_lpr("-r"), Some('x'));
        assert_eq!(lpr_to_lp('x'), Some("-r"));
    }
}
