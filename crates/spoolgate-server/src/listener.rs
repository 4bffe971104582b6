// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Where connections come from.  Under inetd the connection is already
// on fd 0; standalone mode holds a lock file, binds the listening
// sockets itself, and raises privileges just long enough to bind a
// reserved port.

use std::ffi::CString;
use std::io::Write as _;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};

use nix::fcntl::FlockArg;
use nix::unistd::Uid;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use spoolgate_core::config::RUN_DIR;
use spoolgate_core::{Result, SpoolError};
use spoolgate_security::identity::{drop_privileges, raise_privileges};

/// Default lock file for standalone mode.
pub fn default_lock_path() -> PathBuf {
    Path::new(RUN_DIR).join("spoolgate-server.pid")
}

/// Holds the standalone-mode lock for the life of the process.
#[derive(Debug)]
pub struct StandaloneLock {
    _file: std::fs::File,
}

/// Take the standalone lock, failing if another instance holds it.
pub fn acquire_lock(path: &Path) -> Result<StandaloneLock> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| SpoolError::Config(format!("can't open \"{}\": {e}", path.display())))?;

    match nix::fcntl::flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => {}
        Err(nix::errno::Errno::EWOULDBLOCK) => {
            return Err(SpoolError::Config(
                "already running in standalone mode".into(),
            ));
        }
        Err(e) => {
            return Err(SpoolError::Config(format!(
                "can't lock \"{}\": {e}",
                path.display()
            )));
        }
    }

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    debug!(path = %path.display(), "standalone lock taken");
    Ok(StandaloneLock { _file: file })
}

/// Resolve a `-s` argument to a TCP port: a number, or a service name
/// from the services database.
pub fn port_lookup(spec: &str) -> Result<u16> {
    if let Ok(port) = spec.parse::<u16>() {
        if port == 0 {
            return Err(SpoolError::BadArgument("port 0 is not usable".into()));
        }
        return Ok(port);
    }

    let name = CString::new(spec)
        .map_err(|_| SpoolError::BadArgument(format!("bad service name \"{spec}\"")))?;
    let proto = CString::new("tcp").map_err(|_| SpoolError::BadArgument("tcp".into()))?;
    // getservbyname returns a pointer into static storage; the fields
    // are copied out before anything else can call it.
    let serv = unsafe { libc::getservbyname(name.as_ptr(), proto.as_ptr()) };
    if serv.is_null() {
        return Err(SpoolError::BadArgument(format!(
            "service \"{spec}\" is unknown"
        )));
    }
    let s_port = unsafe { (*serv).s_port };
    Ok(u16::from_be(s_port as u16))
}

/// Bind a listening socket on `port`, all interfaces.
///
/// When `safe` is set the process is running with a dropped effective
/// uid and must raise to root around the bind for a reserved port.
pub async fn bind_standalone(port: u16, safe: Option<Uid>) -> Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    let needs_root = port < 1024 && safe.is_some();
    if needs_root {
        raise_privileges()?;
    }
    let bound = socket.bind(addr);
    if needs_root {
        if let Some(safe) = safe {
            drop_privileges(safe)?;
        }
    }
    match bound {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            return Err(SpoolError::Config(format!(
                "there is already a server listening on TCP port {port}"
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let listener = socket.listen(64)?;
    info!(port, "listening");
    Ok(listener)
}

/// Adopt the connection inetd handed us on fd 0.
pub fn inetd_socket() -> Result<TcpStream> {
    let std_stream = unsafe { std::net::TcpStream::from_raw_fd(0) };
    std_stream.set_nonblocking(true).map_err(|e| {
        if e.raw_os_error() == Some(libc::ENOTSOCK) {
            SpoolError::Config(
                "stdin is not a socket; run from inetd, or use -s for standalone mode".into(),
            )
        } else {
            SpoolError::Io(e)
        }
    })?;
    Ok(TcpStream::from_std(std_stream)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ports_parse() {
        assert_eq!(port_lookup("515").unwrap(), 515);
        assert_eq!(port_lookup("10515").unwrap(), 10515);
    }

    #[test]
    fn bad_ports_are_rejected() {
        assert!(port_lookup("0").is_err());
        assert!(port_lookup("no-such-service-zzz").is_err());
    }

    #[test]
    fn the_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.pid");
        let held = acquire_lock(&path).unwrap();
        let err = acquire_lock(&path).unwrap_err();
        assert!(err.to_string().contains("already running in standalone mode"));
        drop(held);
        acquire_lock(&path).unwrap();
    }

    #[tokio::test]
    async fn binding_a_high_port_works_and_conflicts_are_named() {
        let first = bind_standalone(34515, None).await.unwrap();
        let err = bind_standalone(34515, None).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("there is already a server listening on TCP port 34515"));
        drop(first);
    }
}
