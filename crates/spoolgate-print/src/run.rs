// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Child-process execution for backend spooler commands.  Every local
// dispatch funnels through here: an argv module renders the job, this
// module runs the command, optionally as a specific user when the
// caller holds root.

use std::process::Stdio;

use tokio::io::AsyncRead;
use tokio::process::Command;
use tracing::{debug, warn};

use spoolgate_core::{Result, SpoolError};

fn child_failure(program: &str, detail: impl Into<String>) -> SpoolError {
    SpoolError::ChildProcessFailure {
        program: program.to_string(),
        detail: detail.into(),
    }
}

fn nix_io(e: nix::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

/// Arrange for the child to run as `uid` with no way back.
///
/// The first setuid raises to root so the second changes the real,
/// effective, and saved ids together; the child then verifies the drop
/// held before exec.  Failures surface as spawn errors in the parent.
fn apply_uid(cmd: &mut Command, uid: Option<u32>) {
    let Some(uid) = uid else { return };
    unsafe {
        cmd.pre_exec(move || {
            let root = nix::unistd::Uid::from_raw(0);
            let target = nix::unistd::Uid::from_raw(uid);
            nix::unistd::setuid(root).map_err(nix_io)?;
            nix::unistd::setuid(target).map_err(nix_io)?;
            if target != root && nix::unistd::setuid(root).is_ok() {
                return Err(std::io::Error::other("privilege drop did not hold"));
            }
            Ok(())
        });
    }
}

fn exit_code(program: &str, status: std::process::ExitStatus) -> Result<i32> {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => Ok(code),
        None => {
            let signal = status.signal().unwrap_or(0);
            let detail = if status.core_dumped() {
                format!("dumped core on signal {signal}")
            } else {
                format!("killed by signal {signal}")
            };
            Err(child_failure(program, detail))
        }
    }
}

/// Run a backend command with inherited stdio.
///
/// Returns the command's exit code; the command explains its own
/// failures on the inherited stderr.  Signal deaths and exec failures
/// are errors here.
pub async fn run(program: &str, args: &[String], uid: Option<u32>) -> Result<i32> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    apply_uid(&mut cmd, uid);
    debug!(program, ?args, uid, "running backend command");
    let status = cmd
        .status()
        .await
        .map_err(|e| child_failure(program, e.to_string()))?;
    exit_code(program, status)
}

/// Run a backend command with stdout captured into `out` and stderr
/// relayed line-by-line into the log.
///
/// The server uses this to pass queue listings and cancel chatter back
/// to the peer without showing it the backend's diagnostics.
pub async fn run_captured<W>(
    program: &str,
    args: &[String],
    uid: Option<u32>,
    out: &mut W,
) -> Result<i32>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    apply_uid(&mut cmd, uid);
    debug!(program, ?args, uid, "running backend command with captured output");
    let mut child = cmd
        .spawn()
        .map_err(|e| child_failure(program, e.to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| child_failure(program, "stdout pipe missing"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| child_failure(program, "stderr pipe missing"))?;

    let program_owned = program.to_string();
    let stderr_task = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(program = %program_owned, "{line}");
        }
    });

    let copied = tokio::io::copy(&mut stdout, out).await;
    let status = child
        .wait()
        .await
        .map_err(|e| child_failure(program, e.to_string()))?;
    let _ = stderr_task.await;
    copied.map_err(|e| child_failure(program, format!("output relay failed: {e}")))?;
    exit_code(program, status)
}

/// Run a backend command with stdin piped from `input`.
///
/// The caller bounds `input` to the byte range being dispatched, e.g.
/// with `AsyncReadExt::take` over a spool file.
pub async fn run_with_stdin<R>(
    program: &str,
    args: &[String],
    uid: Option<u32>,
    mut input: R,
) -> Result<i32>
where
    R: AsyncRead + Unpin,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::piped());
    apply_uid(&mut cmd, uid);
    debug!(program, ?args, uid, "running backend command with piped input");
    let mut child = cmd
        .spawn()
        .map_err(|e| child_failure(program, e.to_string()))?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| child_failure(program, "stdin pipe missing"))?;

    // The child may stop reading early; a broken pipe must not mask
    // its exit code.
    let copied = tokio::io::copy(&mut input, &mut stdin).await;
    drop(stdin);
    let status = child
        .wait()
        .await
        .map_err(|e| child_failure(program, e.to_string()))?;
    if let Err(e) = copied {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            warn!(program, error = %e, "short write to backend stdin");
        }
    }
    exit_code(program, status)
}
