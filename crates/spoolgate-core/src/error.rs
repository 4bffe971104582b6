// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolgate.

use thiserror::Error;

/// Top-level error type for all Spoolgate operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    // -- Caller mistakes --
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("destination queue not set")]
    NoDestination,

    // -- Destination resolution --
    #[error("The queue \"{queue}\" does not exist on the print server \"{server}\".")]
    UnknownDestination { queue: String, server: String },

    #[error("remote queue entry for \"{queue}\" is broken: {detail}")]
    MalformedRemoteConfig { queue: String, detail: String },

    // -- Network --
    #[error("temporary network failure: {0}")]
    TransientNetworkFailure(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("insufficient spool space: {0}")]
    ResourceExhausted(String),

    // -- Privilege and subprocesses --
    #[error("privilege operation failed: {0}")]
    PrivilegeFailure(String),

    #[error("child process \"{program}\" failed: {detail}")]
    ChildProcessFailure { program: String, detail: String },

    // -- Configuration --
    #[error("configuration error: {0}")]
    Config(String),

    // -- Plumbing --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpoolError {
    /// Process exit code for the front-end command reporting this error.
    ///
    /// The historical wrappers exit 1 for an unknown queue and 255 for
    /// everything that went wrong internally; scripts depend on those
    /// values.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownDestination { .. } => 1,
            _ => 255,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolError>;
