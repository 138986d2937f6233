// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-instance guard (spec.md §5): an exclusive file lock on a PID
//! file in the daemon's state directory. A second daemon pointing at the
//! same state directory detects the live peer via a liveness probe to the
//! recorded PID (`kill(pid, 0)`) and exits, or -- on a stale PID left
//! behind by a `kill -9` -- cleans up and proceeds.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::DaemonError;

/// Holds the daemon's exclusive lock on `pid_path` for the process
/// lifetime; the lock (and the file's contents) are released when this is
/// dropped.
pub struct PidLock {
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Acquire the lock, writing this process's PID into it. Fails with
    /// [`DaemonError::LockHeldByLivePeer`] if another process already holds
    /// the lock and is still alive; a lock file left behind by a crashed
    /// daemon (stale, unlocked) is silently reclaimed.
    pub fn acquire(pid_path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = pid_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Open without truncating so a live peer's PID is never clobbered
        // before we know whether we actually hold the lock.
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(pid_path)?;

        if let Err(io_err) = file.try_lock_exclusive() {
            let pid = read_pid(pid_path);
            return match pid.filter(|&pid| process_is_alive(pid)) {
                Some(pid) => Err(DaemonError::LockHeldByLivePeer { path: pid_path.to_path_buf(), pid }),
                None => {
                    // Stale lock (peer crashed without releasing it, or the
                    // PID in the file is long dead): reclaim by retrying
                    // the lock now that we know no live peer holds it.
                    // `try_lock_exclusive` can still race a genuinely live
                    // peer starting up concurrently, in which case this
                    // second attempt fails honestly too.
                    file.try_lock_exclusive().map_err(|_| DaemonError::Io(io_err))?;
                    Ok(Self::finish_acquire(file, pid_path))
                }
            };
        }

        Ok(Self::finish_acquire(file, pid_path))
    }

    fn finish_acquire(mut file: File, pid_path: &Path) -> Self {
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());
        let _ = file.flush();
        Self { file, path: pid_path.to_path_buf() }
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

#[cfg(unix)]
fn process_is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: i32) -> bool {
    false
}

#[cfg(test)]
#[path = "pid_lock_tests.rs"]
mod tests;
