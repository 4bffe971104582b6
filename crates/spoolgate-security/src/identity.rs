// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Privilege management.  The daemons keep real uid root but do their
// parsing and file access as the unprivileged owner of the main
// configuration file, raising to effective root only around the few
// syscalls that need it.  Remote usernames are never trusted directly;
// they pass through the access decision to become a local identity.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{Uid, User};
use tracing::debug;

use spoolgate_core::{Result, SpoolError};

use crate::access::AccessDecision;

/// The local identity a piece of remote work runs as.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyIdentity {
    pub uid: u32,
    pub gid: u32,
    /// Set when the work runs as a proxy user; PPR submissions carry it
    /// as the `-X` principal class.
    pub proxy_class: Option<String>,
}

/// Determine the unprivileged identity to parse configuration under.
///
/// The caller must hold real uid root.  The safe uid is the owner of
/// `conf_path`; a root-owned configuration file would defeat the whole
/// arrangement and is refused.  On success the effective uid has been
/// switched to the safe owner.
pub fn safe_uid_setup(conf_path: &Path) -> Result<(Uid, Uid)> {
    if !nix::unistd::getuid().is_root() {
        return Err(SpoolError::PrivilegeFailure(
            "this program must be run as root".into(),
        ));
    }

    let meta = std::fs::metadata(conf_path).map_err(|e| {
        SpoolError::Config(format!("can't stat \"{}\": {e}", conf_path.display()))
    })?;
    let safe = Uid::from_raw(meta.uid());
    if safe.is_root() {
        return Err(SpoolError::Config(format!(
            "\"{}\" must not be owned by root",
            conf_path.display()
        )));
    }

    nix::unistd::seteuid(safe)
        .map_err(|e| SpoolError::PrivilegeFailure(format!("seteuid({safe}) failed: {e}")))?;
    debug!(safe_uid = safe.as_raw(), "dropped to safe effective uid");
    Ok((Uid::from_raw(0), safe))
}

/// Raise to effective root for one privileged operation.
pub fn raise_privileges() -> Result<()> {
    nix::unistd::seteuid(Uid::from_raw(0))
        .map_err(|e| SpoolError::PrivilegeFailure(format!("seteuid(0) failed: {e}")))?;
    debug!("raised to effective root");
    Ok(())
}

/// Drop back to the safe effective uid.
pub fn drop_privileges(safe: Uid) -> Result<()> {
    nix::unistd::seteuid(safe)
        .map_err(|e| SpoolError::PrivilegeFailure(format!("seteuid({safe}) failed: {e}")))?;
    debug!(safe_uid = safe.as_raw(), "dropped to safe effective uid");
    Ok(())
}

fn system_lookup(name: &str) -> Option<(u32, u32)> {
    User::from_name(name)
        .ok()
        .flatten()
        .map(|u| (u.uid.as_raw(), u.gid.as_raw()))
}

/// Compute the local identity for work requested by `requested_user`
/// on `fromhost`, against the passwd database.
pub fn proxy_identity(
    decision: &AccessDecision,
    fromhost: &str,
    requested_user: &str,
    is_ppr_queue: bool,
) -> Result<ProxyIdentity> {
    proxy_identity_with(system_lookup, decision, fromhost, requested_user, is_ppr_queue)
}

/// [`proxy_identity`] with an injectable account lookup.
///
/// When the section enables `become user`, the requested username is
/// honored (with root first replaced by the configured substitute; a
/// missing substitute is a fatal misconfiguration).  An unknown
/// requested user, or a section without `become user`, runs as the
/// proxy user with the proxy class attached.
pub fn proxy_identity_with(
    lookup: impl Fn(&str) -> Option<(u32, u32)>,
    decision: &AccessDecision,
    fromhost: &str,
    requested_user: &str,
    is_ppr_queue: bool,
) -> Result<ProxyIdentity> {
    let (become_user, root_as, proxy_user) = if is_ppr_queue {
        (
            decision.ppr_become_user,
            decision.ppr_root_as.as_str(),
            decision.ppr_proxy_user.as_str(),
        )
    } else {
        (
            decision.other_become_user,
            decision.other_root_as.as_str(),
            decision.other_proxy_user.as_str(),
        )
    };

    if become_user {
        let (user, substituted) = if requested_user == "root" {
            (root_as, true)
        } else {
            (requested_user, false)
        };

        match lookup(user) {
            Some((uid, gid)) => {
                debug!(user, uid, "honoring requested user");
                return Ok(ProxyIdentity {
                    uid,
                    gid,
                    proxy_class: None,
                });
            }
            None if substituted => {
                return Err(SpoolError::Config(format!(
                    "root substitute user \"{user}\" does not exist"
                )));
            }
            None => {
                debug!(user, "requested user unknown, falling back to proxy user");
            }
        }
    }

    let Some((uid, gid)) = lookup(proxy_user) else {
        return Err(SpoolError::Config(format!(
            "proxy user \"{proxy_user}\" does not exist"
        )));
    };

    let proxy_class = if decision.ppr_proxy_class == "$cname" {
        fromhost.to_string()
    } else {
        decision.ppr_proxy_class.clone()
    };

    Ok(ProxyIdentity {
        uid,
        gid,
        proxy_class: Some(proxy_class),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision() -> AccessDecision {
        AccessDecision {
            allow: true,
            insecure_ports: false,
            ppr_become_user: true,
            other_become_user: false,
            ppr_root_as: "nobody".into(),
            other_root_as: "nobody".into(),
            ppr_proxy_user: "ppr-remote".into(),
            other_proxy_user: "lp".into(),
            ppr_proxy_class: "$cname".into(),
            ppr_from_format: "$user@$host".into(),
        }
    }

    fn fake_lookup(name: &str) -> Option<(u32, u32)> {
        match name {
            "mary" => Some((1001, 100)),
            "nobody" => Some((65534, 65534)),
            "ppr-remote" => Some((70, 70)),
            "lp" => Some((7, 7)),
            _ => None,
        }
    }

    #[test]
    fn known_users_are_honored_without_a_proxy_class() {
        let id =
            proxy_identity_with(fake_lookup, &decision(), "wks5.example.edu", "mary", true)
                .unwrap();
        assert_eq!(
            id,
            ProxyIdentity {
                uid: 1001,
                gid: 100,
                proxy_class: None
            }
        );
    }

    #[test]
    fn root_is_substituted() {
        let id =
            proxy_identity_with(fake_lookup, &decision(), "wks5.example.edu", "root", true)
                .unwrap();
        assert_eq!(id.uid, 65534);
        assert_eq!(id.proxy_class, None);
    }

    #[test]
    fn a_missing_root_substitute_is_fatal() {
        let mut d = decision();
        d.ppr_root_as = "ghost".into();
        let err = proxy_identity_with(fake_lookup, &d, "wks5.example.edu", "root", true)
            .unwrap_err();
        assert!(matches!(err, SpoolError::Config(_)));
    }

    #[test]
    fn unknown_users_fall_back_to_the_proxy_user() {
        let id =
            proxy_identity_with(fake_lookup, &decision(), "wks5.example.edu", "visitor", true)
                .unwrap();
        assert_eq!(id.uid, 70);
        assert_eq!(id.proxy_class.as_deref(), Some("wks5.example.edu"));
    }

    #[test]
    fn other_queues_use_the_other_side_of_the_decision() {
        // other become user is off, so even a known user runs as the
        // other proxy user.
        let id =
            proxy_identity_with(fake_lookup, &decision(), "wks5.example.edu", "mary", false)
                .unwrap();
        assert_eq!(id.uid, 7);
        assert_eq!(id.proxy_class.as_deref(), Some("wks5.example.edu"));
    }

    #[test]
    fn a_literal_proxy_class_passes_through() {
        let mut d = decision();
        d.ppr_proxy_class = "lab.example.edu".into();
        let id = proxy_identity_with(fake_lookup, &d, "wks5.example.edu", "visitor", true)
            .unwrap();
        assert_eq!(id.proxy_class.as_deref(), Some("lab.example.edu"));
    }

    #[test]
    fn a_missing_proxy_user_is_fatal() {
        let mut d = decision();
        d.ppr_proxy_user = "ghost".into();
        let err = proxy_identity_with(fake_lookup, &d, "wks5.example.edu", "visitor", true)
            .unwrap_err();
        assert!(matches!(err, SpoolError::Config(_)));
    }
}
