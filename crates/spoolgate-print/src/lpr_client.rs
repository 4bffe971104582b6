// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RFC 1179 wire client.  Dials a remote line-printer daemon, from a
// reserved port when the caller holds the privilege for it, and drives
// the job-submission, queue-listing, and job-removal conversations.
// The peer's one-byte acks gate every step; anything unexpected after
// a job has been opened aborts it with the cancel byte.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use spoolgate_core::config::TEMP_DIR;
use spoolgate_core::limits;
use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};
use spoolgate_resolve::RemoteDestination;

use crate::control_file;

/// Default RFC 1179 port, used when neither the address nor
/// /etc/services says otherwise.
pub const LPR_PORT: u16 = 515;

/// Reserved client-port search range.  lpd peers traditionally demand a
/// source port in the low half of the reserved range or better.
const RESERVED_PORT_TOP: u16 = 1023;
const RESERVED_PORT_BOTTOM: u16 = 512;

/// Timeout on the TCP connect itself; kernel connect timeouts are not
/// dependable, so the deadline is enforced here.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Timeout for acks that should come back immediately.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the ack after a data file; printer Ethernet boards can
/// sit on that one for a while.
const PRINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the client socket binds before dialing out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalPort {
    /// Search the reserved range; requires root or a usable saved root
    /// id, and quietly degrades to ephemeral without one.
    Reserved,
    /// Any ephemeral port; fine for peers configured to accept it.
    Ephemeral,
}

/// Queue-listing flavor selected by the wire command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QueryFormat {
    /// `\x03`, the terse per-job listing.
    Short,
    /// `\x04`, the verbose listing.
    Long,
}

impl QueryFormat {
    fn wire_byte(self) -> char {
        match self {
            QueryFormat::Short => '\x03',
            QueryFormat::Long => '\x04',
        }
    }
}

/// One data file of a submission.
#[derive(Debug)]
pub enum DataSource {
    /// The submitting process's standard input, spooled to an unlinked
    /// temp file first so its length is known up front.
    Stdin,
    /// A file on disk, opened at send time.
    Path(String),
    /// A byte range of an already-open spool file.
    Slice {
        file: std::fs::File,
        offset: u64,
        length: u64,
    },
}

impl DataSource {
    /// Open the source, returning a reader limited to exactly the bytes
    /// to be sent and their count.
    async fn open(self) -> Result<(Box<dyn AsyncRead + Unpin + Send>, u64)> {
        match self {
            DataSource::Stdin => {
                let (file, length) = spool_stdin().await?;
                Ok((Box::new(file.take(length)), length))
            }
            DataSource::Path(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| SpoolError::BadArgument(format!("Can't open \"{path}\": {e}")))?;
                let length = file.metadata().await?.len();
                Ok((Box::new(file.take(length)), length))
            }
            DataSource::Slice {
                file,
                offset,
                length,
            } => {
                let mut file = file;
                std::io::Seek::seek(&mut file, std::io::SeekFrom::Start(offset))?;
                Ok((Box::new(tokio::fs::File::from_std(file).take(length)), length))
            }
        }
    }
}

/// Copy standard input into an unlinked temp file so it can be sized
/// and replayed.
async fn spool_stdin() -> Result<(tokio::fs::File, u64)> {
    let file = tempfile::tempfile_in(TEMP_DIR)?;
    let mut file = tokio::fs::File::from_std(file);
    let mut stdin = tokio::io::stdin();
    let length = tokio::io::copy(&mut stdin, &mut file).await?;
    file.seek(std::io::SeekFrom::Start(0)).await?;
    Ok((file, length))
}

/// This host's name as it appears in control files and job file names.
pub fn local_nodename() -> Result<String> {
    let uts = nix::sys::utsname::uname()
        .map_err(|e| SpoolError::Config(format!("uname failed: {e}")))?;
    let name = uts
        .nodename()
        .to_str()
        .ok_or_else(|| SpoolError::Config("nodename is not valid UTF-8".into()))?;
    Ok(name.to_string())
}

/// The "printer" service port from /etc/services, or the RFC 1179
/// default when the database has no entry.
fn printer_service_port() -> u16 {
    // getservbyname keeps static state, but nothing else in this
    // process consults the services database.
    let ent = unsafe { libc::getservbyname(c"printer".as_ptr(), c"tcp".as_ptr()) };
    if ent.is_null() {
        LPR_PORT
    } else {
        u16::from_be(unsafe { (*ent).s_port } as u16)
    }
}

/// Split one failover-list entry into host and optional explicit port.
fn split_host_port(entry: &str) -> Result<(&str, Option<u16>)> {
    match entry.split_once(':') {
        Some((host, port)) => {
            let parsed = control_file::leading_int(port);
            if parsed == 0 || parsed > u32::from(u16::MAX) {
                return Err(SpoolError::BadArgument(
                    "bad port specification in printer address".into(),
                ));
            }
            Ok((host, Some(parsed as u16)))
        }
        None => Ok((entry, None)),
    }
}

fn bind_reserved(socket: &TcpSocket, v4: bool) -> std::io::Result<()> {
    let ip: IpAddr = if v4 {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv6Addr::UNSPECIFIED.into()
    };
    for port in (RESERVED_PORT_BOTTOM..=RESERVED_PORT_TOP).rev() {
        match socket.bind(SocketAddr::new(ip, port)) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AddrInUse,
        "no unused TCP ports available in reserved range",
    ))
}

/// Bind into the reserved range, raising the effective uid around just
/// the bind when the saved id allows it.  A caller with no root to
/// raise gets an ephemeral port; the peer is the one that cares.
fn bind_reserved_as_root(socket: &TcpSocket, v4: bool) -> std::io::Result<()> {
    let saved = nix::unistd::geteuid();
    if saved.is_root() {
        return bind_reserved(socket, v4);
    }
    if nix::unistd::seteuid(nix::unistd::Uid::from_raw(0)).is_err() {
        return Ok(());
    }
    let result = bind_reserved(socket, v4);
    let _ = nix::unistd::seteuid(saved);
    result
}

async fn connect_one(addr: SocketAddr, reserved: bool) -> std::io::Result<TcpStream> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    // Keep-alive notices a peer that died holding our job open.
    socket.set_keepalive(true)?;
    if reserved {
        bind_reserved_as_root(&socket, addr.is_ipv4())?;
    }
    tokio::time::timeout(CONNECT_TIMEOUT, socket.connect(addr))
        .await
        .map_err(|_| std::io::Error::new(ErrorKind::TimedOut, "connect timed out"))?
}

/// An open conversation with a remote lpd.
#[derive(Debug)]
pub struct LprConnection {
    stream: TcpStream,
    /// Host entry we dialed, for error messages.
    peer: String,
}

impl LprConnection {
    /// Connect to `node`, a comma or space separated failover list of
    /// `host[:port]` entries, taking the first that answers.
    pub async fn connect(node: &str, local_port: LocalPort) -> Result<Self> {
        let mut last_err: Option<SpoolError> = None;
        for entry in node
            .split([',', ' ', '\t'])
            .filter(|entry| !entry.is_empty())
        {
            if last_err.is_some() {
                warn!(host = entry, "falling back to the next host in the list");
            }
            match Self::connect_host(entry, local_port).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(host = entry, error = %e, "connection attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| SpoolError::BadArgument("no hosts in remote node list".into())))
    }

    async fn connect_host(entry: &str, local_port: LocalPort) -> Result<Self> {
        let (host, explicit) = split_host_port(entry)?;
        let port = explicit.unwrap_or_else(printer_service_port);

        // Literal addresses skip the resolver.
        let addrs: Vec<SocketAddr> = if let Ok(ip) = host.parse::<IpAddr>() {
            vec![SocketAddr::new(ip, port)]
        } else {
            lookup_host((host, port))
                .await
                .map_err(|e| {
                    SpoolError::TransientNetworkFailure(format!(
                        "IP address lookup for \"{host}\" failed: {e}"
                    ))
                })?
                .collect()
        };

        let reserved = matches!(local_port, LocalPort::Reserved);
        let mut last: Option<std::io::Error> = None;
        for addr in addrs {
            match connect_one(addr, reserved).await {
                Ok(stream) => {
                    info!(host, %addr, "connected to lpd server");
                    return Ok(Self {
                        stream,
                        peer: host.to_string(),
                    });
                }
                Err(e) => {
                    debug!(%addr, error = %e, "address attempt failed");
                    last = Some(e);
                }
            }
        }

        let e = last.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "lookup returned no addresses")
        });
        Err(match e.kind() {
            ErrorKind::TimedOut => SpoolError::TransientNetworkFailure(format!(
                "Timeout while trying to connect to lpd server \"{host}\""
            )),
            ErrorKind::ConnectionRefused => SpoolError::TransientNetworkFailure(format!(
                "Remote system \"{host}\" has refused the connection"
            )),
            ErrorKind::AddrInUse => SpoolError::TransientNetworkFailure(
                "no unused TCP ports available in reserved range".into(),
            ),
            _ => SpoolError::TransientNetworkFailure(format!(
                "connect to \"{host}\" failed: {e}"
            )),
        })
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await.map_err(|e| {
            SpoolError::TransientNetworkFailure(format!("write to lpd server failed: {e}"))
        })
    }

    /// Read the peer's one-byte response; zero means accepted.
    async fn ack(&mut self, timeout: Duration, doing: &str) -> Result<u8> {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(timeout, self.stream.read_exact(&mut byte)).await {
            Err(_) => Err(SpoolError::TransientNetworkFailure(
                "Timeout while waiting for response from print server".into(),
            )),
            Ok(Err(e)) => {
                debug!(error = %e, "response read failed");
                Err(SpoolError::TransientNetworkFailure(format!(
                    "(Connection lost while {doing}.)"
                )))
            }
            Ok(Ok(_)) => Ok(byte[0]),
        }
    }

    /// Abort the job the peer has open.  Best effort: the conversation
    /// is already being torn down when this is sent.
    async fn cancel_job(&mut self) {
        let _ = self.stream.write_all(b"\x01\n").await;
    }

    /// Submit a job: open it with the peer, send the control file, then
    /// each data file.  Returns how many data files were sent.
    ///
    /// `queue_id` comes from [`crate::queue_id::next_queue_id`]; the
    /// caller draws it while it still has the privilege to, and
    /// `sources` supplies the bytes for each entry of `job.files`.
    pub async fn send_job(
        &mut self,
        job: &mut PrintJob,
        dest: &RemoteDestination,
        queue_id: u32,
        sources: Vec<DataSource>,
    ) -> Result<usize> {
        let user = job
            .user
            .clone()
            .ok_or_else(|| SpoolError::BadArgument("user not set".into()))?;
        let node = match job.from_host.clone() {
            Some(host) => host,
            None => local_nodename()?,
        };
        if node.len() > limits::MAX_H || user.len() > limits::MAX_P {
            return Err(SpoolError::BadArgument(
                "local nodename or username is too long".into(),
            ));
        }

        if job.files.is_empty() {
            job.files.push("-".into());
        }
        if sources.len() != job.files.len() {
            return Err(SpoolError::BadArgument(format!(
                "{} data sources for {} files",
                sources.len(),
                job.files.len()
            )));
        }

        // Open the job.  A refusal here needs no cleanup; nothing has
        // been accepted yet.
        self.send(format!("\x02{}\n", dest.printer).as_bytes())
            .await?;
        let code = self.ack(HANDSHAKE_TIMEOUT, "negotiating to send job").await?;
        if code != 0 {
            return Err(SpoolError::TransientNetworkFailure(format!(
                "Remote LPR/LPD system \"{}\" refuses to accept job for \"{}\" ({code})",
                self.peer, dest.printer
            )));
        }

        match self
            .send_job_inner(job, dest, queue_id, &node, sources)
            .await
        {
            Ok(sent) => Ok(sent),
            Err(e) => {
                self.cancel_job().await;
                Err(e)
            }
        }
    }

    async fn send_job_inner(
        &mut self,
        job: &mut PrintJob,
        dest: &RemoteDestination,
        queue_id: u32,
        node: &str,
        sources: Vec<DataSource>,
    ) -> Result<usize> {
        let text = control_file::encode(job, queue_id, node, dest)?;
        let cf_name = control_file::control_file_name(queue_id, node);

        self.send(format!("\x02{} {cf_name}\n", text.len()).as_bytes())
            .await?;
        let code = self
            .ack(HANDSHAKE_TIMEOUT, "negotiating to send control file")
            .await?;
        if code != 0 {
            return Err(SpoolError::TransientNetworkFailure(
                "Remote LPR/LPD system does not have room for control file".into(),
            ));
        }

        self.send(text.as_bytes()).await?;
        self.send(&[0]).await?;
        let code = self
            .ack(HANDSHAKE_TIMEOUT, "transmitting control file")
            .await?;
        if code != 0 {
            return Err(SpoolError::TransientNetworkFailure(format!(
                "Remote LPR/LPD system \"{}\" denies correct receipt of control file",
                self.peer
            )));
        }

        let mut sent = 0usize;
        for (index, source) in sources.into_iter().enumerate() {
            let (mut reader, length) = source.open().await?;
            let df_name = control_file::data_file_name(queue_id, index, node);

            self.send(format!("\x03{length} {df_name}\n").as_bytes())
                .await?;
            let code = self
                .ack(HANDSHAKE_TIMEOUT, "negotiating to send data file")
                .await?;
            if code != 0 {
                return Err(SpoolError::TransientNetworkFailure(format!(
                    "Remote LPR/LPD system \"{}\" does not have room for data file",
                    self.peer
                )));
            }

            tokio::io::copy(&mut reader, &mut self.stream)
                .await
                .map_err(|e| {
                    SpoolError::TransientNetworkFailure(format!(
                        "write to lpd server failed: {e}"
                    ))
                })?;
            self.send(&[0]).await?;
            let code = self.ack(PRINT_TIMEOUT, "sending data file").await?;
            if code != 0 {
                return Err(SpoolError::TransientNetworkFailure(format!(
                    "Remote LPR/LPD system \"{}\" denies correct receipt of data file",
                    self.peer
                )));
            }
            sent += 1;
        }
        Ok(sent)
    }

    /// Ask for a queue listing and copy the peer's response to `out`
    /// until it closes the connection.
    pub async fn query<W>(
        &mut self,
        printer: &str,
        format: QueryFormat,
        args: &[String],
        out: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        line.push(format.wire_byte());
        line.push_str(printer);
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');
        self.send(line.as_bytes()).await?;
        self.stream_response(out).await
    }

    /// Ask the peer to remove jobs, acting as `agent`, and copy its
    /// response to `out`.
    pub async fn remove<W>(
        &mut self,
        printer: &str,
        agent: &str,
        targets: &[String],
        out: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut line = format!("\x05{printer} {agent}");
        for target in targets {
            line.push(' ');
            line.push_str(target);
        }
        line.push('\n');
        self.send(line.as_bytes()).await?;
        self.stream_response(out).await
    }

    async fn stream_response<W>(&mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        tokio::io::copy(&mut self.stream, out).await.map_err(|e| {
            SpoolError::TransientNetworkFailure(format!(
                "read from remote system failed: {e}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn read_line(sock: &mut TcpStream) -> Vec<u8> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            sock.read_exact(&mut byte).await.unwrap();
            line.push(byte[0]);
            if byte[0] == b'\n' {
                return line;
            }
        }
    }

    fn header_length(line: &[u8]) -> usize {
        let text = std::str::from_utf8(&line[1..]).unwrap();
        let (len, _) = text.trim_end().split_once(' ').unwrap();
        len.parse().unwrap()
    }

    fn test_job() -> PrintJob {
        let mut job = PrintJob::new();
        job.user = Some("mary".into());
        job.dest = Some("lw1".into());
        job.from_host = Some("wks9".into());
        job
    }

    fn test_dest(addr: SocketAddr) -> RemoteDestination {
        RemoteDestination {
            node: format!("127.0.0.1:{}", addr.port()),
            printer: "lw1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submission_follows_the_wire_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();

            let open = read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();

            let cf_header = read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let mut control = vec![0u8; header_length(&cf_header) + 1];
            sock.read_exact(&mut control).await.unwrap();
            sock.write_all(&[0]).await.unwrap();

            let df_header = read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let mut data = vec![0u8; header_length(&df_header) + 1];
            sock.read_exact(&mut data).await.unwrap();
            sock.write_all(&[0]).await.unwrap();

            (open, cf_header, control, df_header, data)
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.ps");
        std::fs::write(&path, "%!PS\nshowpage\n").unwrap();
        let path = path.display().to_string();

        let dest = test_dest(addr);
        let mut job = test_job();
        job.files = vec![path.clone()];

        let mut conn = LprConnection::connect(&dest.node, LocalPort::Ephemeral)
            .await
            .unwrap();
        let sent = conn
            .send_job(&mut job, &dest, 7, vec![DataSource::Path(path)])
            .await
            .unwrap();
        assert_eq!(sent, 1);

        let (open, cf_header, control, df_header, data) = server.await.unwrap();
        assert_eq!(open, b"\x02lw1\n");
        assert!(cf_header.ends_with(b" cfA007wks9\n"));
        let control = String::from_utf8(control).unwrap();
        assert!(control.starts_with("Hwks9\nPmary\n"));
        assert!(control.contains("UdfA007.000wks9\n"));
        assert!(control.ends_with('\0'));
        assert!(df_header.ends_with(b" dfA007.000wks9\n"));
        assert_eq!(data, b"%!PS\nshowpage\n\0");
    }

    #[tokio::test]
    async fn refusal_at_open_reports_the_peer_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_line(&mut sock).await;
            sock.write_all(&[1]).await.unwrap();
            // No cancel should follow on a refused open.
            let mut rest = Vec::new();
            sock.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let dest = test_dest(addr);
        let mut job = test_job();
        job.files = vec!["-".into()];

        let mut conn = LprConnection::connect(&dest.node, LocalPort::Ephemeral)
            .await
            .unwrap();
        let err = conn
            .send_job(&mut job, &dest, 3, vec![DataSource::Stdin])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refuses to accept job"));
        drop(conn);

        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_control_file_receipt_sends_the_cancel_byte() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let cf_header = read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let mut control = vec![0u8; header_length(&cf_header) + 1];
            sock.read_exact(&mut control).await.unwrap();
            sock.write_all(&[1]).await.unwrap();

            let mut cancel = [0u8; 2];
            sock.read_exact(&mut cancel).await.unwrap();
            cancel
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "hello\n").unwrap();
        let path = path.display().to_string();

        let dest = test_dest(addr);
        let mut job = test_job();
        job.files = vec![path.clone()];

        let mut conn = LprConnection::connect(&dest.node, LocalPort::Ephemeral)
            .await
            .unwrap();
        let err = conn
            .send_job(&mut job, &dest, 21, vec![DataSource::Path(path)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("denies correct receipt of control file"));

        assert_eq!(&server.await.unwrap(), b"\x01\n");
    }

    #[tokio::test]
    async fn failover_reaches_the_second_host() {
        // A listener bound then dropped leaves a port that refuses.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_port = live.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let _ = live.accept().await.unwrap();
        });

        let node = format!("127.0.0.1:{dead_port},127.0.0.1:{live_port}");
        let conn = LprConnection::connect(&node, LocalPort::Ephemeral).await;
        assert!(conn.is_ok());
        drop(conn);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn bad_port_specification_is_rejected() {
        let err = LprConnection::connect("printhost:nfs", LocalPort::Ephemeral)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad port specification"));
    }

    #[tokio::test]
    async fn query_streams_the_peer_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let line = read_line(&mut sock).await;
            sock.write_all(b"no entries\n").await.unwrap();
            line
        });

        let mut conn =
            LprConnection::connect(&format!("127.0.0.1:{}", addr.port()), LocalPort::Ephemeral)
                .await
                .unwrap();
        let mut out = Vec::new();
        let n = conn
            .query("lw1", QueryFormat::Short, &["mary".into()], &mut out)
            .await
            .unwrap();
        assert_eq!(n, 11);
        assert_eq!(out, b"no entries\n");
        assert_eq!(server.await.unwrap(), b"\x03lw1 mary\n");
    }

    #[tokio::test]
    async fn remove_sends_printer_agent_and_targets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let line = read_line(&mut sock).await;
            sock.write_all(b"dequeued\n").await.unwrap();
            line
        });

        let mut conn =
            LprConnection::connect(&format!("127.0.0.1:{}", addr.port()), LocalPort::Ephemeral)
                .await
                .unwrap();
        let mut out = Vec::new();
        conn.remove("lw1", "mary", &["14".into()], &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"dequeued\n");
        assert_eq!(server.await.unwrap(), b"\x05lw1 mary 14\n");
    }

    #[tokio::test]
    async fn slice_sources_send_only_their_range() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let cf_header = read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let mut control = vec![0u8; header_length(&cf_header) + 1];
            sock.read_exact(&mut control).await.unwrap();
            sock.write_all(&[0]).await.unwrap();
            let df_header = read_line(&mut sock).await;
            sock.write_all(&[0]).await.unwrap();
            let mut data = vec![0u8; header_length(&df_header) + 1];
            sock.read_exact(&mut data).await.unwrap();
            sock.write_all(&[0]).await.unwrap();
            data
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool");
        std::fs::write(&path, "AAAABBBBCCCC").unwrap();
        let file = std::fs::File::open(&path).unwrap();

        let dest = test_dest(addr);
        let mut job = test_job();
        job.files = vec!["middle".into()];

        let mut conn = LprConnection::connect(&dest.node, LocalPort::Ephemeral)
            .await
            .unwrap();
        let sent = conn
            .send_job(
                &mut job,
                &dest,
                5,
                vec![DataSource::Slice {
                    file,
                    offset: 4,
                    length: 4,
                }],
            )
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(&server.await.unwrap(), b"BBBB\0");
    }
}
