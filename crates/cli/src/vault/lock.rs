// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-profile advisory file lock.
//!
//! Follows the `LOCK_FILENAME` / content-`{pid, startedAt}` / stale-lock
//! detection pattern used for per-account credential file locking
//! elsewhere in the retrieved corpus, layered over `fs2`'s
//! `try_lock_exclusive` for the actual cross-process exclusion.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use super::VaultError;
use crate::clock::Clock;

pub const LOCK_FILENAME: &str = ".lock";
const LOCK_WAIT_MS: u64 = 25;
const LOCK_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: u64,
}

/// Held guard for a profile's advisory lock; releases on drop.
pub struct ProfileLock {
    file: File,
    path: PathBuf,
}

impl ProfileLock {
    /// Acquire the lock for `profile_dir`, retrying for up to
    /// `LOCK_TIMEOUT_MS` and stealing a stale lock (dead pid) on sight.
    pub fn acquire(profile_dir: &Path) -> Result<Self, VaultError> {
        std::fs::create_dir_all(profile_dir).map_err(VaultError::io)?;
        let path = profile_dir.join(LOCK_FILENAME);
        let deadline = std::time::Instant::now() + Duration::from_millis(LOCK_TIMEOUT_MS);

        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&path)
                .map_err(VaultError::io)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    write_content(&file, &path)?;
                    return Ok(Self { file, path });
                }
                Err(_) => {
                    if let Some(holder) = read_holder(&path) {
                        if !process_alive(holder.pid) {
                            // Stale lock: the holder is a reaped process. Steal it.
                            drop(file);
                            let _ = std::fs::remove_file(&path);
                            continue;
                        }
                    }
                    if std::time::Instant::now() >= deadline {
                        return Err(VaultError::LockHeld);
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_WAIT_MS));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProfileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

fn write_content(_file: &File, path: &Path) -> Result<(), VaultError> {
    let content = LockContent { pid: std::process::id(), started_at: crate::clock::SystemClock.now_ms() };
    let json = serde_json::to_vec(&content).map_err(|e| VaultError::IOError(e.to_string()))?;
    std::fs::write(path, json).map_err(VaultError::io)
}

fn read_holder(path: &Path) -> Option<LockContent> {
    let mut buf = String::new();
    File::open(path).ok()?.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn process_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}
