// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth-File Vault (§4.A): atomic backup/restore of per-tool credential
//! file sets, with active-profile detection by content hash.
//!
//! Grounded on the profile-directory conventions in the teacher's
//! `profile.rs` (reserved `_`-prefixed names, per-profile metadata) and
//! the corpus's per-account lock-file pattern (see [`lock`]).

mod error;
mod lock;

pub use error::VaultError;
use lock::ProfileLock;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::{Clock, SharedClock};
use crate::tool::Tool;

const RESERVED_PREFIX: &str = "_";
const ORIGINAL_PROFILE: &str = "_original";
const AUTO_BACKUP_PREFIX: &str = "_auto_backup_";
const META_FILENAME: &str = "meta.json";

/// Optional per-profile metadata sidecar. Never part of content hashing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub auth_mode: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<u64>,
    pub browser_hint: Option<String>,
}

pub struct Vault {
    root: PathBuf,
    clock: SharedClock,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self { root: root.into(), clock }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public accessor for a profile's on-disk directory, for callers
    /// (e.g. discovery) that need to read a profile's flattened files
    /// directly rather than through a vault operation.
    pub fn profile_path(&self, tool: Tool, name: &str) -> PathBuf {
        self.profile_dir(tool, name)
    }

    fn tool_dir(&self, tool: Tool) -> PathBuf {
        self.root.join(tool.tag())
    }

    fn profile_dir(&self, tool: Tool, name: &str) -> PathBuf {
        self.tool_dir(tool).join(name)
    }

    fn check_name(name: &str, caller_is_vault: bool) -> Result<(), VaultError> {
        if name.starts_with(RESERVED_PREFIX) && !caller_is_vault {
            return Err(VaultError::ReservedName);
        }
        Ok(())
    }

    /// `HasAuthFiles(T)` — true iff every required member exists on disk.
    pub fn has_auth_files(&self, tool: Tool) -> bool {
        tool.auth_file_specs()
            .iter()
            .filter(|s| s.required)
            .all(|s| s.path.is_file())
    }

    /// `Backup(T, P)`.
    pub fn backup(&self, tool: Tool, name: &str) -> Result<(), VaultError> {
        self.backup_internal(tool, name, false)
    }

    fn backup_internal(&self, tool: Tool, name: &str, caller_is_vault: bool) -> Result<(), VaultError> {
        Self::check_name(name, caller_is_vault)?;
        if !self.has_auth_files(tool) {
            return Err(VaultError::NoAuthFiles);
        }

        let dir = self.profile_dir(tool, name);
        let _lock = ProfileLock::acquire(&dir)?;
        fs::create_dir_all(&dir).map_err(VaultError::io)?;
        set_dir_mode(&dir)?;

        for spec in tool.auth_file_specs() {
            if !spec.path.is_file() {
                continue;
            }
            let bytes = fs::read(&spec.path).map_err(VaultError::io)?;
            atomic_write_private(&dir.join(spec.basename()), &bytes)?;
        }

        let meta_path = dir.join(META_FILENAME);
        if !meta_path.exists() {
            let meta = ProfileMeta { created_at: Some(self.clock.now_ms()), ..Default::default() };
            let json = serde_json::to_vec_pretty(&meta).map_err(|e| VaultError::IOError(e.to_string()))?;
            atomic_write_private(&meta_path, &json)?;
        }

        fsync_dir(&dir)?;
        Ok(())
    }

    /// `Restore(T, P)`.
    pub fn restore(&self, tool: Tool, name: &str) -> Result<(), VaultError> {
        let dir = self.profile_dir(tool, name);
        if !dir.is_dir() {
            return Err(VaultError::NoSuchProfile);
        }
        let _lock = ProfileLock::acquire(&dir)?;

        let specs = tool.auth_file_specs();
        for spec in &specs {
            if spec.required && !dir.join(spec.basename()).is_file() {
                return Err(VaultError::PartialProfile);
            }
        }

        // Snapshot current destination bytes so a partial failure can roll back.
        let mut snapshot: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
        for spec in &specs {
            let prior = if spec.path.is_file() { fs::read(&spec.path).ok() } else { None };
            snapshot.push((spec.path.clone(), prior));
        }

        let mut written_dirs = std::collections::HashSet::new();
        for spec in &specs {
            let src = dir.join(spec.basename());
            if !src.is_file() {
                continue;
            }
            let bytes = match fs::read(&src).map_err(VaultError::io) {
                Ok(b) => b,
                Err(e) => {
                    self.rollback(&snapshot);
                    return Err(e);
                }
            };
            if let Some(parent) = spec.path.parent() {
                if fs::create_dir_all(parent).is_err() {
                    self.rollback(&snapshot);
                    return Err(VaultError::IOError(format!("cannot create {}", parent.display())));
                }
                written_dirs.insert(parent.to_path_buf());
            }
            if let Err(e) = atomic_write_private(&spec.path, &bytes) {
                self.rollback(&snapshot);
                return Err(e);
            }
        }

        for d in written_dirs {
            fsync_dir(&d)?;
        }
        Ok(())
    }

    fn rollback(&self, snapshot: &[(PathBuf, Option<Vec<u8>>)]) {
        for (path, prior) in snapshot {
            match prior {
                Some(bytes) => {
                    let _ = atomic_write_private(path, bytes);
                }
                None => {
                    let _ = fs::remove_file(path);
                }
            }
        }
    }

    /// `Delete(T, P)`.
    pub fn delete(&self, tool: Tool, name: &str) -> Result<(), VaultError> {
        Self::check_name(name, false)?;
        let dir = self.profile_dir(tool, name);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir).map_err(VaultError::io)
    }

    /// `List(T)` — lexicographically sorted, skipping corrupt/partial dirs.
    pub fn list(&self, tool: Tool) -> Vec<String> {
        let dir = self.tool_dir(tool);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let required: Vec<_> = tool.auth_file_specs().into_iter().filter(|s| s.required).collect();
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| {
                let pdir = dir.join(name);
                required.iter().all(|s| pdir.join(s.basename()).is_file())
            })
            .collect();
        names.sort();
        names
    }

    /// `ListAll()`.
    pub fn list_all(&self) -> BTreeMap<Tool, Vec<String>> {
        Tool::ALL.iter().map(|&t| (t, self.list(t))).collect()
    }

    /// `ActiveProfile(T)` — first byte-exact match, deterministic
    /// lexicographic tie-break per invariant 5.
    pub fn active_profile(&self, tool: Tool) -> Option<String> {
        let current_hash = self.hash_current(tool)?;
        self.list(tool).into_iter().find(|name| self.hash_profile(tool, name).as_ref() == Some(&current_hash))
    }

    fn hash_current(&self, tool: Tool) -> Option<[u8; 32]> {
        self.hash_files(tool.auth_file_specs().iter().map(|s| (s.path.clone(), s.required)))
    }

    fn hash_profile(&self, tool: Tool, name: &str) -> Option<[u8; 32]> {
        let dir = self.profile_dir(tool, name);
        self.hash_files(tool.auth_file_specs().iter().map(|s| (dir.join(s.basename()), s.required)))
    }

    /// Hashes the given `(path, required)` members. A required member
    /// that can't be read aborts the whole hash (the set is incomplete);
    /// an absent optional member is skipped rather than aborting, so
    /// `ActiveProfile`'s "if present, byte-identical" semantics (§6)
    /// hold even when an optional file like Claude's `.claude.json`
    /// simply doesn't exist on a given install.
    fn hash_files(&self, members: impl Iterator<Item = (PathBuf, bool)>) -> Option<[u8; 32]> {
        let mut hasher = Sha256::new();
        let mut any = false;
        for (path, required) in members {
            match fs::read(&path) {
                Ok(bytes) => {
                    any = true;
                    hasher.update((bytes.len() as u64).to_le_bytes());
                    hasher.update(&bytes);
                }
                Err(_) if !required => continue,
                Err(_) => return None,
            }
        }
        if !any {
            return None;
        }
        Some(hasher.finalize().into())
    }

    /// `BackupOriginal(T)`.
    pub fn backup_original(&self, tool: Tool) -> Result<bool, VaultError> {
        if self.profile_dir(tool, ORIGINAL_PROFILE).is_dir() || !self.has_auth_files(tool) {
            return Ok(false);
        }
        self.backup_internal(tool, ORIGINAL_PROFILE, true)?;
        Ok(true)
    }

    /// `BackupCurrent(T)` — timestamped auto-backup, used before switches.
    pub fn backup_current(&self, tool: Tool) -> Result<Option<String>, VaultError> {
        if !self.has_auth_files(tool) {
            return Ok(None);
        }
        let name = format!("{AUTO_BACKUP_PREFIX}{}", self.clock.now_ms());
        self.backup_internal(tool, &name, true)?;
        Ok(Some(name))
    }

    /// Reads a profile's `meta.json` sidecar, if present. Never part of
    /// content hashing (§3 `ActiveProfile` relation); used by callers
    /// that need the profile's declared auth mode (e.g. the supervisor's
    /// method-select handoff step) without re-deriving it from the
    /// credential bytes themselves.
    pub fn meta(&self, tool: Tool, name: &str) -> Option<ProfileMeta> {
        let path = self.profile_dir(tool, name).join(META_FILENAME);
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// `RotateAutoBackups(T, max)`.
    pub fn rotate_auto_backups(&self, tool: Tool, max: usize) -> Result<(), VaultError> {
        let mut autos: Vec<String> =
            self.list(tool).into_iter().filter(|n| n.starts_with(AUTO_BACKUP_PREFIX)).collect();
        autos.sort();
        if autos.len() > max {
            for name in &autos[..autos.len() - max] {
                self.delete(tool, name)?;
            }
        }
        Ok(())
    }
}

fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), VaultError> {
    atomic_write_mode(path, bytes, Some(0o600))
}

fn atomic_write_mode(path: &Path, bytes: &[u8], mode: Option<u32>) -> Result<(), VaultError> {
    let parent = path.parent().ok_or_else(|| VaultError::IOError("path has no parent".into()))?;
    let tmp = parent.join(format!(".{}.tmp-{}", path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(), std::process::id()));

    {
        let mut f = File::create(&tmp).map_err(VaultError::io)?;
        f.write_all(bytes).map_err(VaultError::io)?;
        f.sync_all().map_err(VaultError::io)?;
    }

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode)).map_err(VaultError::io)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    fs::rename(&tmp, path).map_err(VaultError::io)?;
    Ok(())
}

fn set_dir_mode(dir: &Path) -> Result<(), VaultError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(VaultError::io)?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn fsync_dir(dir: &Path) -> Result<(), VaultError> {
    #[cfg(unix)]
    {
        let f = File::open(dir).map_err(VaultError::io)?;
        f.sync_all().map_err(VaultError::io)?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

#[cfg(test)]
#[path = "../vault_tests.rs"]
mod tests;
