// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The receive-job command.  The peer sends a control file and data
// files in any order; everything lands in one unlinked spool file
// with per-file offsets, and nothing is handed to a spooler until the
// control file and as many data files as it promised have all
// arrived.  Dispatching early would submit a partial job.

use std::io::SeekFrom;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use spoolgate_core::config::PPR_PATH;
use spoolgate_core::limits::MAX_FILES_PER_JOB;
use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};
use spoolgate_print::control_file::{self, ControlFileInfo, FileSpec};
use spoolgate_print::{argv_bsd, argv_ppr, argv_sysv, run};
use spoolgate_resolve::{resolve, Resolution};
use spoolgate_security::{proxy_identity, AccessDecision};

use crate::client_info::ClientInfo;
use crate::service::ServerContext;

// ---------------------------------------------------------------------
// Disk-space admission thresholds.  A file is refused unless both the
// temp area and the queue area keep this much slack after it lands.
// ---------------------------------------------------------------------
const MIN_INODES: u64 = 100;
const MIN_BLOCKS: u64 = 2048;

/// Free space in 512-byte blocks and inodes.
#[derive(Debug, Clone, Copy)]
pub struct DiskSpace {
    pub free_blocks: u64,
    pub free_files: u64,
}

fn disk_space(path: &str) -> Result<DiskSpace> {
    let vfs = nix::sys::statvfs::statvfs(path)
        .map_err(|e| SpoolError::ResourceExhausted(format!("statvfs(\"{path}\") failed: {e}")))?;
    Ok(DiskSpace {
        free_blocks: (vfs.blocks_available() as u64 * vfs.fragment_size() as u64) / 512,
        free_files: vfs.files_available() as u64,
    })
}

/// May a file of `size` bytes be accepted right now?
pub fn admission_ok(size: u64, temp: DiskSpace, queue: DiskSpace) -> bool {
    let needed = size.div_ceil(512) + MIN_BLOCKS;
    temp.free_files > MIN_INODES
        && temp.free_blocks > needed
        && queue.free_files > MIN_INODES
        && queue.free_blocks > needed
}

/// One received data file: where it sits in the spool file.
#[derive(Debug, Clone, Copy)]
struct ReceivedFile {
    start: u64,
    length: u64,
}

enum Backend {
    Ppr,
    Bsd(String),
    Sysv(String),
}

impl Backend {
    fn program(&self) -> &str {
        match self {
            Backend::Ppr => PPR_PATH,
            Backend::Bsd(p) | Backend::Sysv(p) => p,
        }
    }
}

async fn ack<W>(out: &mut W, code: u8) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(&[code]).await?;
    out.flush().await?;
    Ok(())
}

/// The numeric field after the subcommand byte.
fn leading_u64(s: &str) -> u64 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Everything accumulated for one job on the wire.
#[derive(Default)]
struct Accumulator {
    control: Option<ControlFileInfo>,
    spool: Option<tokio::fs::File>,
    spool_end: u64,
    received: Vec<ReceivedFile>,
}

impl Accumulator {
    fn reset(&mut self) {
        *self = Accumulator::default();
    }

    fn ready(&self) -> bool {
        self.control
            .as_ref()
            .is_some_and(|c| self.received.len() >= c.unlink_lines)
    }
}

/// Receive one data file's bytes into the spool file, acknowledging
/// per the wire protocol.  Returns the recorded extent, or `None` if
/// the file was refused or arrived damaged.
async fn receive_data_file<R, W>(
    reader: &mut R,
    out: &mut W,
    acc: &mut Accumulator,
    size: u64,
    ctx: &ServerContext,
) -> Result<Option<ReceivedFile>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if acc.received.len() >= MAX_FILES_PER_JOB {
        warn!("too many data files in one job");
        ack(out, 2).await?;
        return Ok(None);
    }

    // The spool file is unlinked as soon as it is open, so an aborted
    // connection leaves nothing to clean up.
    if acc.spool.is_none() {
        match tempfile::tempfile_in(&ctx.spool_dir) {
            Ok(file) => acc.spool = Some(tokio::fs::File::from_std(file)),
            Err(e) => {
                warn!(error = %e, "cannot open spool file");
                ack(out, 2).await?;
                return Ok(None);
            }
        }
    }

    let (temp, queue) = (disk_space(&ctx.spool_dir)?, disk_space(&ctx.queue_dir)?);
    if !admission_ok(size, temp, queue) {
        warn!(size, "insufficient disk space to receive file");
        ack(out, 2).await?;
        return Ok(None);
    }
    ack(out, 0).await?;

    let spool = match acc.spool.as_mut() {
        Some(f) => f,
        None => return Ok(None),
    };

    let start = acc.spool_end;
    let mut disk_full = false;
    {
        let mut limited = reader.take(size);
        match tokio::io::copy(&mut limited, spool).await {
            Ok(copied) if copied == size => {}
            Ok(_) => {
                // Peer closed early; the terminator read below fails too.
                ack(out, 1).await?;
                return Ok(None);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WriteZero => disk_full = true,
            Err(e) => {
                warn!(error = %e, "error receiving data file");
                ack(out, 1).await?;
                return Ok(None);
            }
        }
    }

    let mut terminator = [0u8; 1];
    if reader.read_exact(&mut terminator).await.is_err() || terminator[0] != 0 {
        ack(out, 1).await?;
        return Ok(None);
    }
    if disk_full {
        ack(out, 2).await?;
        return Ok(None);
    }

    spool.flush().await?;
    acc.spool_end = start + size;
    ack(out, 0).await?;
    Ok(Some(ReceivedFile {
        start,
        length: size,
    }))
}

/// Receive and decode the control file.
async fn receive_control_file<R, W>(
    reader: &mut R,
    out: &mut W,
    size: u64,
) -> Result<Option<ControlFileInfo>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if size == 0 || size > control_file::MAX_CONTROL_FILE as u64 {
        warn!(size, "control file size out of range");
        ack(out, 1).await?;
        return Ok(None);
    }
    ack(out, 0).await?;

    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body).await?;

    let mut terminator = [0u8; 1];
    if reader.read_exact(&mut terminator).await.is_err() || terminator[0] != 0 {
        ack(out, 1).await?;
        return Ok(None);
    }
    ack(out, 0).await?;

    let text = String::from_utf8_lossy(&body);
    Ok(Some(control_file::decode(&text)))
}

/// Fill in the fields the control file cannot know: the queue, the
/// notification host, and the submitted-for format the access
/// decision prescribes.
fn stamp_job(job: &mut PrintJob, printer: &str, client: &ClientInfo, decision: &AccessDecision) {
    job.dest = Some(printer.to_string());
    job.from_format = Some(decision.ppr_from_format.clone());
    job.mailto_host = Some(client.name.clone());
}

/// Hand the accumulated files to the owning spooler, one run per
/// stretch of identical (copies, type) settings.
async fn dispatch(
    acc: &mut Accumulator,
    backend: &Backend,
    client: &ClientInfo,
    decision: &AccessDecision,
) -> Result<()> {
    let Some(info) = acc.control.as_mut() else {
        return Ok(());
    };
    let job = &mut info.job;

    let requested_user = job.user.clone().unwrap_or_default();
    let identity = proxy_identity(
        decision,
        &client.name,
        &requested_user,
        matches!(backend, Backend::Ppr),
    )?;
    if let Some(class) = &identity.proxy_class {
        job.proxy_class = Some(class.clone());
    }

    // Only run backends as another user when we really are root;
    // otherwise inherit, which is what tests do.
    let uid = nix::unistd::getuid().is_root().then_some(identity.uid);

    let program = backend.program().to_string();
    let mut args: Vec<String> = Vec::new();
    let mut last_settings: Option<(u32, char)> = None;

    for (index, received) in acc.received.iter().enumerate() {
        let spec = info.files.get(index).copied().unwrap_or(FileSpec {
            file_type: 'f',
            copies: 1,
        });
        let settings = (spec.copies.max(1), spec.file_type);
        if last_settings != Some(settings) {
            job.copies = Some(settings.0);
            job.content_type_lpr = Some(settings.1);
            args = match backend {
                Backend::Ppr => argv_ppr::build(job)?,
                Backend::Bsd(_) => argv_bsd::build(job)?,
                Backend::Sysv(_) => argv_sysv::build(job)?,
            };
            last_settings = Some(settings);
        }

        let mut argv = args.clone();
        if matches!(backend, Backend::Ppr) {
            if let Some(name) = info.names.get(index) {
                argv.push("--lpq-filename".into());
                argv.push(if name.is_empty() { "stdin".into() } else { name.clone() });
            }
        }

        let Some(spool) = acc.spool.as_mut() else {
            warn!("control file promised data files that never arrived");
            break;
        };
        spool.seek(SeekFrom::Start(received.start)).await?;
        let segment = (&mut *spool).take(received.length);

        debug!(program = %program, file = index, length = received.length, "dispatching file");
        let code = run::run_with_stdin(&program, &argv, uid, segment).await?;
        if code != 0 {
            warn!(program = %program, code, "spooler command failed");
        }
    }

    Ok(())
}

/// Execute the receive-job command for `printer`.
///
/// `reader` is positioned just past the command line; subcommands are
/// processed until the peer closes the connection.
pub async fn take_job<R, W>(
    reader: &mut R,
    out: &mut W,
    printer: &str,
    client: &ClientInfo,
    decision: &AccessDecision,
    ctx: &ServerContext,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let backend = match resolve(printer, &ctx.paths, false)? {
        Some(Resolution::Ppr) => Backend::Ppr,
        Some(Resolution::Bsd) => match ctx.conf.path_lpr().and_then(|p| p.to_str()) {
            Some(p) => Backend::Bsd(p.to_string()),
            None => {
                warn!(printer, "no lpr path configured");
                ack(out, 1).await?;
                return Ok(());
            }
        },
        Some(Resolution::Sysv) => match ctx.conf.path_lp().and_then(|p| p.to_str()) {
            Some(p) => Backend::Sysv(p.to_string()),
            None => {
                warn!(printer, "no lp path configured");
                ack(out, 1).await?;
                return Ok(());
            }
        },
        _ => {
            debug!(printer, "queue not claimed by any spooler");
            ack(out, 1).await?;
            return Ok(());
        }
    };
    ack(out, 0).await?;

    let mut acc = Accumulator::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        let Some(&code) = line.first() else {
            continue;
        };
        let rest = String::from_utf8_lossy(&line[1..]).into_owned();

        match code {
            1 => {
                debug!("job aborted by peer");
                acc.reset();
            }
            2 => {
                debug!(name = %rest, "control file announced");
                if let Some(mut info) =
                    receive_control_file(reader, out, leading_u64(&rest)).await?
                {
                    stamp_job(&mut info.job, printer, client, decision);
                    acc.control = Some(info);
                }
            }
            3 => {
                debug!(name = %rest, "data file announced");
                if let Some(received) =
                    receive_data_file(reader, out, &mut acc, leading_u64(&rest), ctx).await?
                {
                    acc.received.push(received);
                }
            }
            other => {
                warn!(code = other, "unrecognized subcommand");
                ack(out, 2).await?;
            }
        }

        if acc.ready() {
            dispatch(&mut acc, &backend, client, decision).await?;
            acc.reset();
        }
    }

    // The peer is gone; these can only be logged.
    if let Some(info) = &acc.control {
        warn!(
            received = acc.received.len(),
            expected = info.unlink_lines,
            "partial job received"
        );
    } else if acc.spool.is_some() {
        warn!(
            files = acc.received.len(),
            "data file(s) received with no control file"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServerContext;
    use spoolgate_core::config::UprintConf;
    use spoolgate_resolve::ResolverPaths;
    use spoolgate_security::access::AccessDecision;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    fn decision() -> AccessDecision {
        AccessDecision {
            allow: true,
            insecure_ports: true,
            ppr_become_user: false,
            other_become_user: false,
            ppr_root_as: "nobody".into(),
            other_root_as: "nobody".into(),
            ppr_proxy_user: "unused".into(),
            other_proxy_user: "unused".into(),
            ppr_proxy_class: "$cname".into(),
            ppr_from_format: "$user@$host".into(),
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            name: "wks5.example.edu".into(),
            ip: "10.0.0.5".into(),
            port: 721,
        }
    }

    fn fake_command(dir: &Path, name: &str, script: &str) -> String {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{script}").unwrap();
        let mut perms = f.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn context(dir: &Path, lpr_path: &str) -> ServerContext {
        let printcap = dir.join("printcap");
        std::fs::write(&printcap, "printq:lp=/dev/null:\n").unwrap();
        let conf_path = dir.join("uprint.conf");
        std::fs::write(&conf_path, format!("[well known]\nlpr = {lpr_path}\n")).unwrap();
        ServerContext {
            access: spoolgate_security::AccessControl::default(),
            conf: UprintConf::load(&conf_path),
            paths: ResolverPaths {
                ppr_aliases: dir.join("aliases"),
                ppr_groups: dir.join("groups"),
                ppr_printers: dir.join("printers"),
                printcap,
                lp_classes: dir.join("classes"),
                lp_printers: dir.join("lp-printers"),
                printers_conf: None,
                remote_conf: dir.join("uprint-remote.conf"),
            },
            arrest_interest_interval: None,
            nodename: "testserver".into(),
            spool_dir: dir.to_str().unwrap().to_string(),
            queue_dir: dir.to_str().unwrap().to_string(),
        }
    }

    // Dispatch looks the proxy user up in passwd, so tests that reach
    // it need an account guaranteed to exist.
    fn decision_with_real_proxy() -> AccessDecision {
        let mut d = decision();
        d.ppr_proxy_user = "root".into();
        d.other_proxy_user = "root".into();
        d
    }

    #[tokio::test]
    async fn unknown_printers_are_refused_with_one_byte() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "/bin/true");

        let (mut peer, ours) = tokio::io::duplex(4096);
        let (read_half, mut write_half) = tokio::io::split(ours);
        let mut reader = tokio::io::BufReader::new(read_half);

        take_job(&mut reader, &mut write_half, "nowhere", &client(), &decision(), &ctx)
            .await
            .unwrap();

        let mut response = [0u8; 1];
        peer.read_exact(&mut response).await.unwrap();
        assert_eq!(response[0], 1);
    }

    #[tokio::test]
    async fn a_complete_job_is_dispatched_to_lpr() {
        let dir = tempfile::tempdir().unwrap();
        let received = dir.path().join("received.txt");
        let lpr = fake_command(
            dir.path(),
            "lpr",
            &format!("cat > {}", received.display()),
        );
        let ctx = context(dir.path(), &lpr);

        let control = "Hwks5.example.edu\nPmary\nfdfA041wks5\nUdfA041wks5\nNreport.txt\n";
        let data = b"the report body\n";

        let (mut peer, ours) = tokio::io::duplex(65536);
        let server = {
            let ctx = context(dir.path(), &lpr);
            tokio::spawn(async move {
                let (read_half, mut write_half) = tokio::io::split(ours);
                let mut reader = tokio::io::BufReader::new(read_half);
                take_job(
                    &mut reader,
                    &mut write_half,
                    "printq",
                    &client(),
                    &decision_with_real_proxy(),
                    &ctx,
                )
                .await
            })
        };

        let mut ack = [0u8; 1];
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0, "printer accepted");

        // Data file first, the way many clients order them.
        peer.write_all(format!("\x03{} dfA041wks5\n", data.len()).as_bytes())
            .await
            .unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0, "space available");
        peer.write_all(data).await.unwrap();
        peer.write_all(&[0]).await.unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0, "data file received");

        peer.write_all(format!("\x02{} cfA041wks5\n", control.len()).as_bytes())
            .await
            .unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0, "room for control file");
        peer.write_all(control.as_bytes()).await.unwrap();
        peer.write_all(&[0]).await.unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0, "control file received");

        drop(peer);
        server.await.unwrap().unwrap();

        let body = std::fs::read_to_string(&received).unwrap();
        assert_eq!(body, "the report body\n");
    }

    #[tokio::test]
    async fn a_bad_terminator_fails_the_control_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "/bin/true");

        let (mut peer, ours) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(ours);
            let mut reader = tokio::io::BufReader::new(read_half);
            take_job(&mut reader, &mut write_half, "printq", &client(), &decision(), &ctx).await
        });

        let mut ack = [0u8; 1];
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0);

        peer.write_all(b"\x025 cfA041wks5\n").await.unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0);
        peer.write_all(b"Pmary").await.unwrap();
        peer.write_all(&[7]).await.unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 1, "damaged transfer denied");

        drop(peer);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_control_files_are_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "/bin/true");

        let (mut peer, ours) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(ours);
            let mut reader = tokio::io::BufReader::new(read_half);
            take_job(&mut reader, &mut write_half, "printq", &client(), &decision(), &ctx).await
        });

        let mut ack = [0u8; 1];
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0);

        peer.write_all(b"\x02999999999 cfA041wks5\n").await.unwrap();
        peer.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 1);

        drop(peer);
        server.await.unwrap().unwrap();
    }

    #[test]
    fn admission_arithmetic() {
        let plenty = DiskSpace {
            free_blocks: 1 << 20,
            free_files: 1 << 16,
        };
        let tight_blocks = DiskSpace {
            free_blocks: MIN_BLOCKS + 1,
            free_files: 1 << 16,
        };
        let tight_files = DiskSpace {
            free_blocks: 1 << 20,
            free_files: MIN_INODES,
        };
        assert!(admission_ok(4096, plenty, plenty));
        assert!(!admission_ok(4096, tight_blocks, plenty));
        assert!(!admission_ok(4096, plenty, tight_files));
        // Exactly at the boundary is still a refusal.
        let boundary = DiskSpace {
            free_blocks: 4096 / 512 + MIN_BLOCKS,
            free_files: MIN_INODES + 1,
        };
        assert!(!admission_ok(4096, boundary, plenty));
    }

    #[test]
    fn leading_numbers_ignore_the_name_field() {
        assert_eq!(leading_u64("124 dfA041wks5"), 124);
        assert_eq!(leading_u64(""), 0);
        assert_eq!(leading_u64("junk"), 0);
    }
}
