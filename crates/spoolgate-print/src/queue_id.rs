// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The lpr queue-id sequence.  RFC 1179 job file names carry a three
// digit number; this module deals them out of a counter file shared by
// every submitting process on the host.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::fcntl::{flock, FlockArg};

use spoolgate_core::config::LPR_PREVID_FILE;
use spoolgate_core::Result;

use crate::control_file::leading_int;

/// Draw the next queue id, creating the counter file on first use.
///
/// Ids run 1 through 999 and wrap; the file ends up owned by whoever
/// creates it, which is why callers draw ids before dropping privilege.
pub fn next_queue_id() -> Result<u32> {
    next_queue_id_at(Path::new(LPR_PREVID_FILE))
}

pub fn next_queue_id_at(path: &Path) -> Result<u32> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .mode(0o644)
                .open(path)?;
            file.write_all(b"1\n")?;
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    // The exclusive lock covers only the read-increment-write cycle;
    // it drops with the file handle.
    flock(file.as_raw_fd(), FlockArg::LockExclusive)
        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let mut id = leading_int(&text).saturating_add(1);
    if !(1..=999).contains(&id) {
        id = 1;
    }

    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    writeln!(file, "{id}")?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_one_and_counts_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastid");
        assert_eq!(next_queue_id_at(&path).unwrap(), 1);
        assert_eq!(next_queue_id_at(&path).unwrap(), 2);
        assert_eq!(next_queue_id_at(&path).unwrap(), 3);
    }

    #[test]
    fn sequence_wraps_after_999() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastid");
        std::fs::write(&path, "999\n").unwrap();
        assert_eq!(next_queue_id_at(&path).unwrap(), 1);
    }

    #[test]
    fn unparsable_counter_restarts_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastid");
        std::fs::write(&path, "last was seven").unwrap();
        assert_eq!(next_queue_id_at(&path).unwrap(), 1);
        std::fs::write(&path, "-41\n").unwrap();
        assert_eq!(next_queue_id_at(&path).unwrap(), 1);
    }

    #[test]
    fn counter_survives_reuse_with_trailing_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastid");
        std::fs::write(&path, "41\nstale").unwrap();
        assert_eq!(next_queue_id_at(&path).unwrap(), 42);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "42\n");
    }
}
