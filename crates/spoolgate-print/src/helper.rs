// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Parent side of the privilege boundary.  Ordinary users cannot bind
// reserved ports, so all remote-wire work runs in the setuid-root
// `spoolgate-helper` program.  The helper talks back over its stdout
// with length-prefixed JSON records; this module spawns it, feeds it
// the request, and demultiplexes the records into the log, the
// caller's output stream, and the error return.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};
use spoolgate_resolve::RemoteDestination;

use crate::lpr_client::QueryFormat;

/// Installed location of the setuid helper.
pub const HELPER_PATH: &str = "/usr/lib/ppr/lib/spoolgate-helper";

/// A record must fit in one read; the helper only sends small ones.
const MAX_RECORD: u32 = 1 << 20;

/// What the parent asks the helper to do.  Serialized as the helper's
/// second argument; the first is the verb again, for the benefit of ps.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum HelperRequest {
    Submit {
        job: PrintJob,
        dest: RemoteDestination,
    },
    Query {
        dest: RemoteDestination,
        format: QueryFormat,
        args: Vec<String>,
    },
    Remove {
        dest: RemoteDestination,
        agent: String,
        targets: Vec<String>,
    },
}

impl HelperRequest {
    pub fn verb(&self) -> &'static str {
        match self {
            HelperRequest::Submit { .. } => "submit",
            HelperRequest::Query { .. } => "query",
            HelperRequest::Remove { .. } => "remove",
        }
    }
}

/// One record on the helper's stdout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HelperRecord {
    /// A diagnostic for the parent's log.
    Log { level: String, message: String },
    /// A chunk of the remote peer's response, for query and remove.
    Output { text: String },
    /// The verb completed.
    Done { queue_id: Option<u32>, files_sent: usize },
    /// The verb failed; `error_kind` restores the error category.
    Failed { error_kind: String, message: String },
}

/// Write one length-prefixed record.
pub async fn write_record<W>(out: &mut W, record: &HelperRecord) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(record)?;
    out.write_all(&(body.len() as u32).to_be_bytes()).await?;
    out.write_all(&body).await?;
    out.flush().await?;
    Ok(())
}

/// Read one record, or `None` at end of stream.
pub async fn read_record<R>(input: &mut R) -> Result<Option<HelperRecord>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match input.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(prefix);
    if len > MAX_RECORD {
        return Err(SpoolError::ProtocolViolation(format!(
            "oversized helper record ({len} bytes)"
        )));
    }
    let mut body = vec![0u8; len as usize];
    input.read_exact(&mut body).await.map_err(|e| {
        SpoolError::ProtocolViolation(format!("truncated helper record: {e}"))
    })?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// The category tag a [`HelperRecord::Failed`] carries for this error.
pub fn error_kind(e: &SpoolError) -> &'static str {
    match e {
        SpoolError::BadArgument(_) | SpoolError::NoDestination => "bad_argument",
        SpoolError::TransientNetworkFailure(_) => "transient",
        SpoolError::ProtocolViolation(_) => "protocol",
        SpoolError::PrivilegeFailure(_) => "privilege",
        SpoolError::ResourceExhausted(_) => "resource",
        _ => "internal",
    }
}

fn restore_error(kind: &str, message: String) -> SpoolError {
    match kind {
        "bad_argument" => SpoolError::BadArgument(message),
        "transient" => SpoolError::TransientNetworkFailure(message),
        "protocol" => SpoolError::ProtocolViolation(message),
        "privilege" => SpoolError::PrivilegeFailure(message),
        "resource" => SpoolError::ResourceExhausted(message),
        _ => SpoolError::ChildProcessFailure {
            program: "spoolgate-helper".into(),
            detail: message,
        },
    }
}

/// Drain the helper's record stream, relaying peer output into `out`.
///
/// Returns the `Done` record's payload; a `Failed` record or an
/// unterminated stream is an error.
pub async fn consume_records<R, W>(
    input: &mut R,
    mut out: Option<&mut W>,
) -> Result<(Option<u32>, usize)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(record) = read_record(input).await? {
        match record {
            HelperRecord::Log { level, message } => match level.as_str() {
                "debug" => debug!(helper = true, "{message}"),
                "warn" => warn!(helper = true, "{message}"),
                _ => info!(helper = true, "{message}"),
            },
            HelperRecord::Output { text } => {
                if let Some(out) = out.as_deref_mut() {
                    out.write_all(text.as_bytes()).await?;
                }
            }
            HelperRecord::Done {
                queue_id,
                files_sent,
            } => return Ok((queue_id, files_sent)),
            HelperRecord::Failed { error_kind, message } => {
                return Err(restore_error(&error_kind, message));
            }
        }
    }
    Err(SpoolError::ProtocolViolation(
        "helper exited without a completion record".into(),
    ))
}

async fn run_helper<W>(request: &HelperRequest, out: Option<&mut W>) -> Result<(Option<u32>, usize)>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_string(request)?;
    let mut child = Command::new(HELPER_PATH)
        .arg(request.verb())
        .arg(body)
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| SpoolError::ChildProcessFailure {
            program: HELPER_PATH.into(),
            detail: e.to_string(),
        })?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SpoolError::ChildProcessFailure {
            program: HELPER_PATH.into(),
            detail: "stdout pipe missing".into(),
        })?;

    let outcome = consume_records(&mut stdout, out).await;
    let status = child.wait().await.map_err(|e| SpoolError::ChildProcessFailure {
        program: HELPER_PATH.into(),
        detail: e.to_string(),
    })?;
    if outcome.is_ok() && !status.success() {
        return Err(SpoolError::ChildProcessFailure {
            program: HELPER_PATH.into(),
            detail: format!("exited {status} after reporting success"),
        });
    }
    outcome
}

/// Submit `job` to a remote queue through the helper.  Returns the
/// queue id the helper drew for the job.
pub async fn submit_remote(job: &PrintJob, dest: &RemoteDestination) -> Result<u32> {
    let request = HelperRequest::Submit {
        job: job.clone(),
        dest: dest.clone(),
    };
    let (queue_id, files_sent) = run_helper::<Vec<u8>>(&request, None).await?;
    debug!(?queue_id, files_sent, "remote submission finished");
    queue_id.ok_or_else(|| {
        SpoolError::ProtocolViolation("helper reported no queue id for a submission".into())
    })
}

/// List a remote queue through the helper, streaming the peer's
/// response into `out`.
pub async fn query_remote<W>(
    dest: &RemoteDestination,
    format: QueryFormat,
    args: &[String],
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let request = HelperRequest::Query {
        dest: dest.clone(),
        format,
        args: args.to_vec(),
    };
    run_helper(&request, Some(out)).await?;
    Ok(())
}

/// Remove jobs on a remote queue through the helper.
pub async fn remove_remote<W>(
    dest: &RemoteDestination,
    agent: &str,
    targets: &[String],
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let request = HelperRequest::Remove {
        dest: dest.clone(),
        agent: agent.to_string(),
        targets: targets.to_vec(),
    };
    run_helper(&request, Some(out)).await?;
    Ok(())
}
