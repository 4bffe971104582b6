// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The submit, query, and cancel entry points.  Each one resolves the
// destination, then either runs the owning spooler's command with an
// argv built for it or drives the wire client through the setuid
// helper.  The return value is the exit code the front-end command
// should exit with; exec-level failures and protocol errors come back
// as errors instead.

use tokio::io::AsyncWrite;
use tracing::{debug, info};

use spoolgate_core::config::{UprintConf, PPOP_PATH, PPR_PATH};
use spoolgate_core::limits;
use spoolgate_core::types::PrintJob;
use spoolgate_core::{Result, SpoolError};
use spoolgate_resolve::{resolve, Resolution, ResolverPaths};

use crate::lpr_client::local_nodename;
pub use crate::lpr_client::QueryFormat;
use crate::{argv_bsd, argv_ppr, argv_sysv, helper, run};

fn unknown_destination(queue: &str) -> SpoolError {
    SpoolError::UnknownDestination {
        queue: queue.to_string(),
        server: local_nodename().unwrap_or_else(|_| "localhost".to_string()),
    }
}

fn backend_path<'a>(conf: &'a UprintConf, which: &str) -> Result<&'a str> {
    let path = match which {
        "lpr" => conf.path_lpr(),
        "lpq" => conf.path_lpq(),
        "lprm" => conf.path_lprm(),
        "lp" => conf.path_lp(),
        "lpstat" => conf.path_lpstat(),
        "cancel" => conf.path_cancel(),
        _ => None,
    };
    path.and_then(|p| p.to_str())
        .ok_or_else(|| SpoolError::Config(format!("no usable path for \"{which}\"")))
}

/// Submit a job to whichever spooler owns its destination.
///
/// PPR submissions run `ppr` once per file so each gets its own queue
/// entry with its own name; the other local spoolers take every file
/// on one command line.  Remote destinations go through the setuid
/// helper.  Returns the exit code of the spooler command, or 0 for a
/// completed remote submission.
pub async fn submit(
    job: &mut PrintJob,
    conf: &UprintConf,
    paths: &ResolverPaths,
    remote_too: bool,
) -> Result<i32> {
    job.validate_for_submission()?;
    let queue = job.dest.clone().unwrap_or_default();

    if job.files.len() > limits::MAX_FILES_PER_JOB {
        return Err(SpoolError::BadArgument(format!(
            "too many files ({} > {})",
            job.files.len(),
            limits::MAX_FILES_PER_JOB
        )));
    }

    let resolution =
        resolve(&queue, paths, remote_too)?.ok_or_else(|| unknown_destination(&queue))?;
    info!(queue, backend = resolution.backend_name(), "submitting job");

    match resolution {
        Resolution::Ppr => {
            let base = argv_ppr::build(job)?;

            // ppr takes one file per invocation; --lpq-filename makes
            // the queue listing show the original name.
            if job.files.is_empty() {
                let mut args = base;
                args.push("--lpq-filename".into());
                args.push("stdin".into());
                return run::run(PPR_PATH, &args, None).await;
            }
            for file in &job.files {
                let mut args = base.clone();
                args.push("--lpq-filename".into());
                args.push(if file == "-" { "stdin".into() } else { file.clone() });
                args.push(file.clone());
                let code = run::run(PPR_PATH, &args, None).await?;
                if code != 0 {
                    return Ok(code);
                }
            }
            Ok(0)
        }
        Resolution::Bsd => {
            let mut args = argv_bsd::build(job)?;
            args.extend(job.files.iter().filter(|f| *f != "-").cloned());
            run::run(backend_path(conf, "lpr")?, &args, None).await
        }
        Resolution::Sysv => {
            let mut args = argv_sysv::build(job)?;
            args.extend(job.files.iter().filter(|f| *f != "-").cloned());
            run::run(backend_path(conf, "lp")?, &args, None).await
        }
        Resolution::Remote(dest) => {
            let queue_id = helper::submit_remote(job, &dest).await?;
            debug!(queue_id, node = %dest.node, printer = %dest.printer, "job accepted");
            Ok(0)
        }
    }
}

/// List a queue, writing the listing to `out`.
///
/// `arrest_interest_interval` is passed through to ppop so a server
/// front-end can suppress interest in long-arrested jobs.  `uid`
/// selects the user the listing command runs as when the caller holds
/// root; local front-ends pass `None` and run as themselves.
pub async fn query<W>(
    queue: &str,
    format: QueryFormat,
    args: &[String],
    uid: Option<u32>,
    arrest_interest_interval: Option<&str>,
    conf: &UprintConf,
    paths: &ResolverPaths,
    remote_too: bool,
    out: &mut W,
) -> Result<i32>
where
    W: AsyncWrite + Unpin,
{
    let resolution =
        resolve(queue, paths, remote_too)?.ok_or_else(|| unknown_destination(queue))?;
    debug!(queue, backend = resolution.backend_name(), "listing queue");

    match resolution {
        Resolution::Ppr => {
            let mut argv: Vec<String> = Vec::new();
            if let Some(interval) = arrest_interest_interval {
                argv.push("--arrest-interest-interval".into());
                argv.push(interval.to_string());
            }
            argv.push(
                match format {
                    QueryFormat::Short => "lpq",
                    QueryFormat::Long => "nhlist",
                }
                .into(),
            );
            argv.push(queue.to_string());
            argv.extend(args.iter().cloned());
            run::run_captured(PPOP_PATH, &argv, uid, out).await
        }
        Resolution::Sysv => {
            let mut argv: Vec<String> = vec!["-o".into(), queue.to_string()];
            argv.extend(args.iter().cloned());
            run::run_captured(backend_path(conf, "lpstat")?, &argv, uid, out).await
        }
        Resolution::Bsd => {
            let mut argv: Vec<String> = vec!["-P".into(), queue.to_string()];
            if matches!(format, QueryFormat::Long) {
                argv.push("-l".into());
            }
            argv.extend(args.iter().cloned());
            run::run_captured(backend_path(conf, "lpq")?, &argv, uid, out).await
        }
        Resolution::Remote(dest) => {
            helper::query_remote(&dest, format, args, out).await?;
            Ok(0)
        }
    }
}

fn is_job_number(target: &str) -> bool {
    !target.is_empty() && target.bytes().all(|b| b.is_ascii_digit())
}

/// The principal string a proxy cancellation acts for.  Root acts for
/// every user in the class.
fn proxy_for(agent: &str, proxy_class: &str) -> String {
    format!(
        "{}@{proxy_class}",
        if agent == "root" { "*" } else { agent }
    )
}

/// Cancel jobs on a PPR queue with ppop, one run per list item.
///
/// The target list mixes job numbers and usernames the way the lprm
/// command line does.  An empty list cancels the agent's active job,
/// except that the special agent "-all" empties the whole queue.
async fn cancel_ppr<W>(
    queue: &str,
    agent: &str,
    proxy_class: Option<&str>,
    targets: &[String],
    uid: Option<u32>,
    out: &mut W,
) -> Result<i32>
where
    W: AsyncWrite + Unpin,
{
    if queue.len() > limits::MAX_PPR_DESTNAME {
        return Err(SpoolError::BadArgument(format!(
            "the print queue name \"{queue}\" is too long"
        )));
    }
    if agent.len() > limits::MAX_P {
        return Err(SpoolError::BadArgument(format!(
            "the agent name \"{agent}\" is too long"
        )));
    }
    if let Some(class) = proxy_class {
        if class.len() > limits::MAX_H {
            return Err(SpoolError::BadArgument(format!(
                "the proxy class name \"{class}\" is too long"
            )));
        }
    }

    // Notice goes to the job's owner only when root does the
    // canceling; ordinary agents cancel silently.
    let cancel_verb = if agent == "root" { "cancel" } else { "scancel" };
    let mut worst = 0;

    for target in targets {
        let mut argv: Vec<String> = Vec::new();

        if is_job_number(target) {
            if let Some(class) = proxy_class {
                argv.push("-X".into());
                argv.push(proxy_for(agent, class));
            }
            argv.push(cancel_verb.into());
            argv.push(format!("{queue}-{target}"));
        } else {
            // A username.  Only the user themself or root may delete
            // by username; the refusal goes to the requester the way
            // lprm would print it.
            if agent != target && agent != "root" {
                let refusal = match proxy_class {
                    Some(class) => format!(
                        "You may not delete jobs belonging to \"{target}@{class}\" because\n\
                         they are not your's and you are not \"root@{class}\".\n"
                    ),
                    None => format!(
                        "You may not delete jobs belonging to \"{target}\" because\n\
                         they are not your's and you are not \"root\".\n"
                    ),
                };
                use tokio::io::AsyncWriteExt;
                out.write_all(refusal.as_bytes()).await?;
                out.flush().await?;
                worst = 1;
                continue;
            }
            if target.len() > limits::MAX_P {
                return Err(SpoolError::BadArgument(format!(
                    "username \"{target}\" is too long"
                )));
            }
            if let Some(class) = proxy_class {
                argv.push("-X".into());
                argv.push(format!("{target}@{class}"));
            }
            argv.push(cancel_verb.into());
            argv.push(queue.to_string());
        }

        let code = run::run_captured(PPOP_PATH, &argv, uid, out).await?;
        if code != 0 {
            worst = code;
        }
    }

    if targets.is_empty() {
        let mut argv: Vec<String> = Vec::new();

        if agent == "-all" {
            // The wire protocol spells "delete everything" as the
            // agent "-all" with an empty list.
            match proxy_class {
                Some(class) => {
                    argv.push("-X".into());
                    argv.push(format!("*@{class}"));
                    argv.push("cancel".into());
                    argv.push(queue.to_string());
                }
                None => {
                    argv.push("purge".into());
                    argv.push(queue.to_string());
                }
            }
        } else {
            match proxy_class {
                Some(class) => {
                    argv.push("-X".into());
                    argv.push(proxy_for(agent, class));
                    argv.push(format!("{cancel_verb}-my-active"));
                    argv.push(queue.to_string());
                }
                None => {
                    argv.push("cancel-active".into());
                    argv.push(queue.to_string());
                }
            }
        }

        let code = run::run_captured(PPOP_PATH, &argv, uid, out).await?;
        if code != 0 {
            worst = code;
        }
    }

    Ok(worst)
}

/// Cancel jobs on whichever spooler owns the queue.
///
/// `agent` is the user requesting the deletion, `proxy_class` the host
/// or domain a server is acting for, `None` for local requests.
pub async fn cancel<W>(
    queue: &str,
    agent: &str,
    proxy_class: Option<&str>,
    targets: &[String],
    uid: Option<u32>,
    conf: &UprintConf,
    paths: &ResolverPaths,
    remote_too: bool,
    out: &mut W,
) -> Result<i32>
where
    W: AsyncWrite + Unpin,
{
    let resolution =
        resolve(queue, paths, remote_too)?.ok_or_else(|| unknown_destination(queue))?;
    info!(queue, agent, backend = resolution.backend_name(), "canceling jobs");

    match resolution {
        Resolution::Ppr => cancel_ppr(queue, agent, proxy_class, targets, uid, out).await,
        Resolution::Bsd => {
            let mut argv: Vec<String> = vec!["-P".into(), queue.to_string()];
            argv.extend(targets.iter().cloned());
            run::run_captured(backend_path(conf, "lprm")?, &argv, uid, out).await
        }
        Resolution::Sysv => {
            // cancel takes request ids of the form printer-number; a
            // bare printer name cancels its current request.
            let mut argv: Vec<String> = Vec::new();
            if targets.is_empty() {
                argv.push(queue.to_string());
            } else {
                for target in targets {
                    if is_job_number(target) {
                        argv.push(format!("{queue}-{target}"));
                    } else {
                        argv.push("-u".into());
                        argv.push(target.clone());
                    }
                }
            }
            run::run_captured(backend_path(conf, "cancel")?, &argv, uid, out).await
        }
        Resolution::Remote(dest) => {
            helper::remove_remote(&dest, agent, targets, out).await?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    // A resolver layout in a tempdir where only the BSD printcap
    // claims anything.
    fn paths_with_printcap(dir: &Path, queue: &str) -> ResolverPaths {
        let printcap = dir.join("printcap");
        std::fs::write(&printcap, format!("{queue}|test queue:lp=/dev/null:\n")).unwrap();
        ResolverPaths {
            ppr_aliases: dir.join("aliases"),
            ppr_groups: dir.join("groups"),
            ppr_printers: dir.join("printers"),
            printcap,
            lp_classes: dir.join("classes"),
            lp_printers: dir.join("lp-printers"),
            printers_conf: None,
            remote_conf: dir.join("uprint-remote.conf"),
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

    fn conf_with(dir: &Path, entries: &[(&str, &str)]) -> UprintConf {
        let path = dir.join("uprint.conf");
        let mut text = String::from("[well known]\n");
        for (key, value) in entries {
            text.push_str(&format!("{key} = {value}\n"));
        }
        std::fs::write(&path, text).unwrap();
        UprintConf::load(&path)
    }

    #[tokio::test]
    async fn unknown_queues_are_reported_with_the_server_name() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_with_printcap(dir.path(), "somewhere");
        let conf = conf_with(dir.path(), &[]);

        let mut job = PrintJob::new();
        job.dest = Some("nowhere".into());
        job.user = Some("mary".into());
        let err = submit(&mut job, &conf, &paths, false).await.unwrap_err();
        match err {
            SpoolError::UnknownDestination { queue, .. } => assert_eq!(queue, "nowhere"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn bsd_submission_runs_lpr_with_the_files_appended() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_with_printcap(dir.path(), "printq");
        let marker = dir.path().join("argv.txt");
        let lpr = fake_command(
            dir.path(),
            "lpr",
            &format!("echo \"$@\" > {}", marker.display()),
        );
        let conf = conf_with(dir.path(), &[("lpr", &lpr)]);

        let data = dir.path().join("report.txt");
        std::fs::write(&data, "hello\n").unwrap();

        let mut job = PrintJob::new();
        job.dest = Some("printq".into());
        job.user = Some("mary".into());
        job.files = vec![data.to_str().unwrap().to_string()];
        let code = submit(&mut job, &conf, &paths, false).await.unwrap();
        assert_eq!(code, 0);

        let argv = std::fs::read_to_string(&marker).unwrap();
        assert!(argv.contains("-P printq"));
        assert!(argv.trim_end().ends_with(data.to_str().unwrap()));
    }

    #[tokio::test]
    async fn a_missing_backend_path_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_with_printcap(dir.path(), "printq");
        let conf = conf_with(dir.path(), &[]);

        let mut job = PrintJob::new();
        job.dest = Some("printq".into());
        job.user = Some("mary".into());
        let err = submit(&mut job, &conf, &paths, false).await.unwrap_err();
        assert!(matches!(err, SpoolError::Config(_)));
    }

    #[tokio::test]
    async fn query_uses_lpq_with_the_long_flag() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_with_printcap(dir.path(), "printq");
        let lpq = fake_command(dir.path(), "lpq", "echo listing for $2 \"$3\"");
        let conf = conf_with(dir.path(), &[("lpq", &lpq)]);

        let mut out = Vec::new();
        let code = query(
            "printq",
            QueryFormat::Long,
            &[],
            None,
            None,
            &conf,
            &paths,
            false,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "listing for printq -l\n");
    }

    #[tokio::test]
    async fn cancel_by_another_users_name_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_with_printcap(dir.path(), "printq");
        // Queue claimed by BSD would not reach the ownership check, so
        // exercise the ppr path directly.
        drop(paths);

        let mut out = Vec::new();
        let code = cancel_ppr(
            "printq",
            "mary",
            None,
            &["fred".to_string()],
            None,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(code, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("belonging to \"fred\""));
        assert!(text.contains("you are not \"root\""));
    }

    #[tokio::test]
    async fn overlong_names_are_rejected_before_any_command_runs() {
        let mut out = Vec::new();
        let err = cancel_ppr(
            "a-queue-name-well-beyond-the-limit",
            "mary",
            None,
            &[],
            None,
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SpoolError::BadArgument(_)));
    }

    #[test]
    fn job_numbers_are_digit_strings() {
        assert!(is_job_number("107"));
        assert!(!is_job_number("mary"));
        assert!(!is_job_number("12a"));
        assert!(!is_job_number(""));
    }

    #[test]
    fn root_proxies_for_the_whole_class() {
        assert_eq!(proxy_for("mary", "lab.example.org"), "mary@lab.example.org");
        assert_eq!(proxy_for("root", "lab.example.org"), "*@lab.example.org");
    }
}
