// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolgate-server — the RFC 1179 network face of the local spoolers.
//
// Entry point.  Normally run from inetd with the accepted connection
// on fd 0; with -s it binds its own ports and accepts connections
// until terminated.

mod client_info;
mod listener;
mod service;
mod takejob;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use spoolgate_core::config::{HOME_DIR, UPRINT_CONF};
use spoolgate_core::Result;
use spoolgate_security::access::LPRSRV_CONF;
use spoolgate_security::identity::safe_uid_setup;

use service::ServerContext;

#[derive(Parser, Debug)]
#[command(
    name = "spoolgate-server",
    version,
    about = "RFC 1179 print server front-ending PPR, BSD lpr, and System V lp"
)]
struct Args {
    /// Run standalone, listening on this TCP port or service name.
    /// May be given more than once.
    #[arg(short = 's', long = "standalone-port")]
    standalone_port: Vec<String>,

    /// Seconds of disinterest after which ppop stops following a job,
    /// passed through to queue listings.
    #[arg(short = 'A', long = "arrest-interest-interval")]
    arrest_interest_interval: Option<String>,
}

/// Strip inherited environment down to what backend commands need.
/// Shell-startup hooks in particular must not fire inside children
/// that run as other users.  Must run before the async runtime spawns
/// its worker threads.
fn scrub_environment() {
    for var in ["IFS", "ENV", "BASH_ENV", "CDPATH", "LD_PRELOAD", "LD_LIBRARY_PATH"] {
        // No other threads exist yet.
        unsafe { std::env::remove_var(var) };
    }
    unsafe { std::env::set_var("PATH", "/bin:/usr/bin") };
}

async fn serve_one(stream: tokio::net::TcpStream, ctx: Arc<ServerContext>) {
    let peer = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, "connection vanished before identification");
            return;
        }
    };
    let client = client_info::identify(peer).await;
    info!(host = %client.name, ip = %client.ip, port = client.port, "connection");
    if let Err(e) = service::serve_connection(stream, &client, &ctx).await {
        warn!(host = %client.name, error = %e, "connection ended with an error");
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("listener stopping");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(serve_one(stream, ctx));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Root is required both to bind port 515 and to submit backend
    // work as the job owners.  The safe-uid switch happens before any
    // configuration file is read.
    let (_root, safe) = safe_uid_setup(Path::new(UPRINT_CONF))?;

    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(0o022));
    if let Err(e) = nix::unistd::chdir(HOME_DIR) {
        warn!(dir = HOME_DIR, error = %e, "can't change to home directory");
    }

    let ctx = Arc::new(service::standard_context(
        Path::new(LPRSRV_CONF),
        args.arrest_interest_interval,
    )?);

    if args.standalone_port.is_empty() {
        let stream = listener::inetd_socket()?;
        serve_one(stream, ctx).await;
        return Ok(());
    }

    let _lock = listener::acquire_lock(&listener::default_lock_path())?;
    let shutdown = Arc::new(Notify::new());
    let mut loops = Vec::new();
    for spec in &args.standalone_port {
        let port = listener::port_lookup(spec)?;
        let bound = listener::bind_standalone(port, Some(safe)).await?;
        loops.push(tokio::spawn(accept_loop(
            bound,
            Arc::clone(&ctx),
            Arc::clone(&shutdown),
        )));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.notify_waiters();
    for handle in loops {
        let _ = handle.await;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    scrub_environment();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "can't start the async runtime");
            std::process::exit(255);
        }
    };
    if let Err(e) = runtime.block_on(run(args)) {
        error!(error = %e, "startup failed");
        std::process::exit(e.exit_code());
    }
}
