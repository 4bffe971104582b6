// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Who is on the other end of the socket.  The printable IP address is
// always good enough; a reverse DNS name replaces it only after a
// forward lookup proves the name really maps back to the peer, since
// anyone who controls their own reverse zone could otherwise claim to
// be any host they liked.

use std::net::SocketAddr;

use tracing::{debug, warn};
use trust_dns_resolver::TokioAsyncResolver;

/// Longest hostname the access-control machinery will consider.
pub const MAX_HOSTNAME: usize = 127;

/// The peer's identity as the rest of the server sees it.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Verified DNS name, or the printable IP address.
    pub name: String,
    pub ip: String,
    pub port: u16,
}

impl ClientInfo {
    /// True if the peer connected from outside the reserved port range.
    pub fn insecure_port(&self) -> bool {
        self.port > 1024
    }
}

fn capped(mut name: String) -> String {
    if name.len() > MAX_HOSTNAME {
        name.truncate(MAX_HOSTNAME);
    }
    name
}

/// Identify the peer at `addr`, verifying any reverse DNS name with a
/// forward cross-check.  DNS trouble of any kind falls back to the IP
/// address; it never fails the connection.
pub async fn identify(addr: SocketAddr) -> ClientInfo {
    let ip = addr.ip().to_string();
    let mut name = ip.clone();

    match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => {
            if let Ok(reverse) = resolver.reverse_lookup(addr.ip()).await {
                if let Some(ptr) = reverse.iter().next() {
                    let candidate = ptr
                        .to_utf8()
                        .trim_end_matches('.')
                        .to_ascii_lowercase();
                    match resolver.lookup_ip(candidate.as_str()).await {
                        Ok(forward) if forward.iter().any(|a| a == addr.ip()) => {
                            debug!(ip = %ip, name = %candidate, "reverse lookup verified");
                            name = candidate;
                        }
                        _ => {
                            warn!(ip = %ip, name = %candidate,
                                "reverse lookup failed the forward cross-check");
                        }
                    }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "no usable DNS resolver configuration");
        }
    }

    ClientInfo {
        name: capped(name),
        ip,
        port: addr.port(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_check_uses_the_reserved_boundary() {
        let mut client = ClientInfo {
            name: "wks5.example.edu".into(),
            ip: "10.0.0.5".into(),
            port: 721,
        };
        assert!(!client.insecure_port());
        client.port = 1024;
        assert!(!client.insecure_port());
        client.port = 1025;
        assert!(client.insecure_port());
    }

    #[test]
    fn names_are_capped() {
        let long = "a".repeat(200);
        assert_eq!(capped(long).len(), MAX_HOSTNAME);
    }
}
