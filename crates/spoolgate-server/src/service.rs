// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One connection, one command.  An lpd peer sends a single command
// line and the rest of the conversation depends on its first byte.
// Anything a human might need to read (refusals, operator messages)
// goes down the socket itself, since that is the only channel the
// remote lpr user ever sees.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use spoolgate_core::config::{UprintConf, LOG_DIR};
use spoolgate_core::{Result, SpoolError};
use spoolgate_print::QueryFormat;
use spoolgate_resolve::{resolve, Resolution, ResolverPaths};
use spoolgate_security::{proxy_identity, AccessControl, AccessDecision};

use crate::client_info::ClientInfo;
use crate::takejob;

/// Field separators on lpd command lines.  Vertical tab and form feed
/// count, matching what old BSD clients emit.
const LPD_WHITESPACE: [char; 4] = [' ', '\t', '\x0b', '\x0c'];

/// Longest command line accepted before the peer is written off.
const MAX_COMMAND_LINE: usize = 2048;

/// Everything a connection handler needs, shared across connections.
pub struct ServerContext {
    pub access: AccessControl,
    pub conf: UprintConf,
    pub paths: ResolverPaths,
    /// Passed through to ppop for queue listings.
    pub arrest_interest_interval: Option<String>,
    /// Our own name, for operator messages.
    pub nodename: String,
    /// Where received data files are spooled.
    pub spool_dir: String,
    /// The spooler's queue area, checked for space before accepting.
    pub queue_dir: String,
}

fn log_file() -> String {
    format!("{LOG_DIR}/spoolgate-server")
}

async fn say<W>(out: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn queue_missing<W>(out: &mut W, queue: &str, nodename: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    say(
        out,
        &format!("The queue \"{queue}\" does not exist on the print server \"{nodename}\".\n"),
    )
    .await
}

async fn server_problem<W>(out: &mut W, doing: &str, nodename: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    say(
        out,
        &format!(
            "Could not {doing} due to a problem with the print server\n\
             called \"{nodename}\".  Please ask the print server's\n\
             system administrator to examine the log file \"{}\"\n\
             to learn the details.\n",
            log_file()
        ),
    )
    .await
}

/// Handle the queue-listing commands (short and long form).
async fn do_list<W>(out: &mut W, rest: &str, format: QueryFormat, ctx: &ServerContext) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut fields = rest
        .split(LPD_WHITESPACE)
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    let Some(queue) = fields.next() else {
        warn!("queue listing request without a queue name");
        return Ok(());
    };
    let args: Vec<String> = fields.collect();

    debug!(queue = %queue, ?format, "queue listing requested");
    match spoolgate_print::query(
        &queue,
        format,
        &args,
        None,
        ctx.arrest_interest_interval.as_deref(),
        &ctx.conf,
        &ctx.paths,
        false,
        out,
    )
    .await
    {
        Ok(0) => Ok(()),
        Ok(code) => {
            warn!(queue = %queue, code, "queue listing command failed");
            server_problem(out, "get a queue listing", &ctx.nodename).await
        }
        Err(SpoolError::UnknownDestination { queue, .. }) => {
            queue_missing(out, &queue, &ctx.nodename).await
        }
        Err(e) => {
            warn!(queue = %queue, error = %e, "queue listing failed");
            server_problem(out, "get a queue listing", &ctx.nodename).await
        }
    }
}

/// Handle the remove-jobs command.
async fn do_remove<W>(
    out: &mut W,
    rest: &str,
    client: &ClientInfo,
    decision: &AccessDecision,
    ctx: &ServerContext,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut fields = rest
        .split(LPD_WHITESPACE)
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    let (Some(queue), Some(agent)) = (fields.next(), fields.next()) else {
        warn!("remove request missing queue or agent");
        return Ok(());
    };
    let targets: Vec<String> = fields.collect();

    let is_ppr = match resolve(&queue, &ctx.paths, false)? {
        Some(Resolution::Ppr) => true,
        Some(_) => false,
        None => return queue_missing(out, &queue, &ctx.nodename).await,
    };

    let identity = proxy_identity(decision, &client.name, &agent, is_ppr)?;
    let uid = nix::unistd::getuid().is_root().then_some(identity.uid);

    info!(queue = %queue, agent = %agent, host = %client.name, "job removal requested");
    match spoolgate_print::cancel(
        &queue,
        &agent,
        identity.proxy_class.as_deref(),
        &targets,
        uid,
        &ctx.conf,
        &ctx.paths,
        false,
        out,
    )
    .await
    {
        Ok(_) => Ok(()),
        Err(SpoolError::UnknownDestination { queue, .. }) => {
            queue_missing(out, &queue, &ctx.nodename).await
        }
        Err(e) => {
            warn!(queue = %queue, error = %e, "job removal failed");
            server_problem(out, "delete the job or jobs", &ctx.nodename).await
        }
    }
}

/// Serve one lpd connection on `stream`.
///
/// The access decision happens before the command line is read; a host
/// that is not allowed to connect gets a one-line explanation and
/// nothing else.
pub async fn serve_connection<S>(stream: S, client: &ClientInfo, ctx: &ServerContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut out) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let decision = ctx.access.resolve(&client.name)?;
    if !decision.allow {
        info!(host = %client.name, "connection refused");
        return say(
            &mut out,
            &format!("Node \"{}\" is not allowed to connect\n", client.name),
        )
        .await;
    }
    if client.insecure_port() && !decision.insecure_ports {
        info!(host = %client.name, port = client.port, "insecure port refused");
        return say(
            &mut out,
            &format!(
                "Node \"{}\" is not allowed to connect from insecure ports\n",
                client.name
            ),
        )
        .await;
    }

    let mut line = Vec::new();
    let n = (&mut reader)
        .take(MAX_COMMAND_LINE as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        debug!(host = %client.name, "peer sent no command");
        return Ok(());
    }
    if n == MAX_COMMAND_LINE && line.last() != Some(&b'\n') {
        return Err(SpoolError::ProtocolViolation(
            "command line too long".into(),
        ));
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    let Some(&command) = line.first() else {
        return Err(SpoolError::ProtocolViolation("empty command line".into()));
    };
    let rest = String::from_utf8_lossy(&line[1..]).into_owned();

    match command {
        // Start-printing is a formality; the queues drain themselves.
        1 => {
            debug!(host = %client.name, "print-any-waiting-jobs command");
            Ok(())
        }
        2 => {
            let queue = rest
                .split(LPD_WHITESPACE)
                .find(|f| !f.is_empty())
                .unwrap_or("")
                .to_string();
            info!(host = %client.name, queue = %queue, "job submission");
            takejob::take_job(&mut reader, &mut out, &queue, client, &decision, ctx).await
        }
        3 => do_list(&mut out, &rest, QueryFormat::Short, ctx).await,
        4 => do_list(&mut out, &rest, QueryFormat::Long, ctx).await,
        5 => do_remove(&mut out, &rest, client, &decision, ctx).await,
        other => {
            warn!(host = %client.name, command = other, "unrecognized command byte");
            Err(SpoolError::ProtocolViolation(format!(
                "unrecognized command byte {other}"
            )))
        }
    }
}

/// Build a context from an access-control file and the standard
/// configuration locations.
pub fn standard_context(
    access_conf: &Path,
    arrest_interest_interval: Option<String>,
) -> Result<ServerContext> {
    let nodename = spoolgate_print::lpr_client::local_nodename()?;
    Ok(ServerContext {
        access: AccessControl {
            conf: access_conf.to_path_buf(),
            ..AccessControl::default()
        },
        conf: UprintConf::load(Path::new(spoolgate_core::config::UPRINT_CONF)),
        paths: ResolverPaths::default(),
        arrest_interest_interval,
        nodename,
        spool_dir: spoolgate_core::config::TEMP_DIR.to_string(),
        queue_dir: spoolgate_core::config::QUEUE_DIR.to_string(),
    })
}
