// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The setuid-root helper behind remote submissions, listings, and
// removals.  It exists because the peer demands a reserved source
// port: the socket is bound while effective-root, then the process
// drops permanently to the invoking user before any protocol byte is
// exchanged.  Everything it has to say goes back to the parent as
// length-prefixed JSON records on stdout; no subscriber is installed,
// so nothing else leaks onto the pipe.
//
// The invoker's claims are not trusted: the username in a submission
// must match the real uid's account and the origin host must match
// this host, or a user could submit jobs in someone else's name.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tokio::io::{AsyncWrite, Stdout};

use spoolgate_core::config::UPRINT_CONF;
use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};
use spoolgate_resolve::RemoteDestination;

use spoolgate_print::helper::{error_kind, write_record, HelperRecord, HelperRequest};
use spoolgate_print::lpr_client::{local_nodename, DataSource, LocalPort, QueryFormat};
use spoolgate_print::queue_id::next_queue_id;
use spoolgate_print::LprConnection;

async fn log<W>(out: &mut W, level: &str, message: String) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_record(
        out,
        &HelperRecord::Log {
            level: level.into(),
            message,
        },
    )
    .await
}

/// Drop to the real uid for good.  With the effective uid still root,
/// `setuid` replaces the real, effective, and saved ids together; the
/// verification step proves there is no way back.
fn drop_privileges() -> Result<()> {
    let real = nix::unistd::getuid();
    nix::unistd::setuid(real)
        .map_err(|e| SpoolError::PrivilegeFailure(format!("setuid({real}) failed: {e}")))?;
    if !real.is_root() && nix::unistd::seteuid(nix::unistd::Uid::from_raw(0)).is_ok() {
        return Err(SpoolError::PrivilegeFailure(
            "privilege drop did not hold".into(),
        ));
    }
    Ok(())
}

/// Draw a queue id while wearing the configuration owner's effective
/// uid, so the counter file never ends up owned by root or by the
/// invoking user.
fn draw_queue_id() -> Result<u32> {
    let meta = std::fs::metadata(Path::new(UPRINT_CONF)).map_err(|e| {
        SpoolError::Config(format!("can't stat \"{UPRINT_CONF}\": {e}"))
    })?;
    let owner = nix::unistd::Uid::from_raw(meta.uid());
    if owner.is_root() {
        return Err(SpoolError::PrivilegeFailure(format!(
            "\"{UPRINT_CONF}\" must not be owned by root"
        )));
    }
    nix::unistd::seteuid(owner)
        .map_err(|e| SpoolError::PrivilegeFailure(format!("seteuid({owner}) failed: {e}")))?;
    let id = next_queue_id();
    let restore = nix::unistd::seteuid(nix::unistd::Uid::from_raw(0))
        .map_err(|e| SpoolError::PrivilegeFailure(format!("seteuid(0) failed: {e}")));
    let id = id?;
    restore?;
    Ok(id)
}

/// Refuse a submission whose identity fields do not describe the
/// invoking user on this host.  Root may speak for anyone; that is
/// how the server relays proxy jobs.
fn verify_identity(job: &mut PrintJob) -> Result<()> {
    let real = nix::unistd::getuid();
    if real.is_root() {
        return Ok(());
    }

    let account = nix::unistd::User::from_uid(real)
        .map_err(|e| SpoolError::PrivilegeFailure(format!("uid lookup failed: {e}")))?
        .ok_or_else(|| {
            SpoolError::PrivilegeFailure(format!("no account for uid {real}"))
        })?;
    if job.user.as_deref() != Some(account.name.as_str()) {
        return Err(SpoolError::PrivilegeFailure(format!(
            "job claims user \"{}\" but the invoker is \"{}\"",
            job.user.as_deref().unwrap_or(""),
            account.name
        )));
    }

    let node = local_nodename()?;
    match job.from_host.as_deref() {
        None => job.from_host = Some(node),
        Some(host) if host == node => {}
        Some(host) => {
            return Err(SpoolError::PrivilegeFailure(format!(
                "job claims origin host \"{host}\" but this host is \"{node}\""
            )));
        }
    }
    Ok(())
}

async fn do_submit(
    out: &mut Stdout,
    mut job: PrintJob,
    dest: RemoteDestination,
) -> Result<(Option<u32>, usize)> {
    verify_identity(&mut job)?;

    let mut conn = LprConnection::connect(&dest.node, LocalPort::Reserved).await?;
    log(out, "debug", format!("connected to \"{}\"", dest.node)).await?;

    let queue_id = draw_queue_id()?;
    drop_privileges()?;
    log(out, "debug", format!("queue id {queue_id}, privileges dropped")).await?;

    if job.files.is_empty() {
        job.files.push("-".into());
    }
    let sources = job
        .files
        .iter()
        .map(|f| {
            if f == "-" {
                DataSource::Stdin
            } else {
                DataSource::Path(f.clone())
            }
        })
        .collect();

    let sent = conn.send_job(&mut job, &dest, queue_id, sources).await?;
    Ok((Some(queue_id), sent))
}

async fn do_query(
    out: &mut Stdout,
    dest: RemoteDestination,
    format: QueryFormat,
    args: Vec<String>,
) -> Result<(Option<u32>, usize)> {
    let mut conn = LprConnection::connect(&dest.node, LocalPort::Reserved).await?;
    drop_privileges()?;

    let mut response = Vec::new();
    conn.query(&dest.printer, format, &args, &mut response)
        .await?;
    write_record(
        out,
        &HelperRecord::Output {
            text: String::from_utf8_lossy(&response).into_owned(),
        },
    )
    .await?;
    Ok((None, 0))
}

async fn do_remove(
    out: &mut Stdout,
    dest: RemoteDestination,
    agent: String,
    targets: Vec<String>,
) -> Result<(Option<u32>, usize)> {
    let mut conn = LprConnection::connect(&dest.node, LocalPort::Reserved).await?;
    drop_privileges()?;

    let mut response = Vec::new();
    conn.remove(&dest.printer, &agent, &targets, &mut response)
        .await?;
    write_record(
        out,
        &HelperRecord::Output {
            text: String::from_utf8_lossy(&response).into_owned(),
        },
    )
    .await?;
    Ok((None, 0))
}

async fn run(out: &mut Stdout) -> Result<()> {
    let mut args = std::env::args().skip(1);
    let verb = args
        .next()
        .ok_or_else(|| SpoolError::BadArgument("missing verb".into()))?;
    let body = args
        .next()
        .ok_or_else(|| SpoolError::BadArgument("missing request".into()))?;
    let request: HelperRequest = serde_json::from_str(&body)?;
    if request.verb() != verb {
        return Err(SpoolError::BadArgument(format!(
            "verb \"{verb}\" does not match the request"
        )));
    }

    let (queue_id, files_sent) = match request {
        HelperRequest::Submit { job, dest } => do_submit(out, job, dest).await?,
        HelperRequest::Query { dest, format, args } => do_query(out, dest, format, args).await?,
        HelperRequest::Remove {
            dest,
            agent,
            targets,
        } => do_remove(out, dest, agent, targets).await?,
    };

    write_record(
        out,
        &HelperRecord::Done {
            queue_id,
            files_sent,
        },
    )
    .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut out = tokio::io::stdout();
    if let Err(e) = run(&mut out).await {
        let record = HelperRecord::Failed {
            error_kind: error_kind(&e).into(),
            message: e.to_string(),
        };
        let _ = write_record(&mut out, &record).await;
        std::process::exit(1);
    }
}
