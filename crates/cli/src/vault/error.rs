// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors surfaced by the Auth-File Vault (§4.A). Hand-written, matching
/// the teacher's `ErrorCode` convention rather than a `thiserror` derive.
#[derive(Debug)]
pub enum VaultError {
    NoAuthFiles,
    ReservedName,
    NoSuchProfile,
    PartialProfile,
    LockHeld,
    IOError(String),
}

impl VaultError {
    pub fn io(e: std::io::Error) -> Self {
        VaultError::IOError(e.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            VaultError::NoAuthFiles => "no_auth_files",
            VaultError::ReservedName => "reserved_name",
            VaultError::NoSuchProfile => "no_such_profile",
            VaultError::PartialProfile => "partial_profile",
            VaultError::LockHeld => "lock_held",
            VaultError::IOError(_) => "io_error",
        }
    }

    /// Process exit code per §6's exit-code table when this error reaches
    /// the binary's top level unconverted.
    pub fn exit_code(&self) -> i32 {
        match self {
            VaultError::IOError(_) => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::NoAuthFiles => write!(f, "no auth files present on disk for this tool"),
            VaultError::ReservedName => write!(f, "profile names starting with '_' are reserved"),
            VaultError::NoSuchProfile => write!(f, "no such profile"),
            VaultError::PartialProfile => write!(f, "profile is missing a required auth file"),
            VaultError::LockHeld => write!(f, "profile is locked by another process"),
            VaultError::IOError(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for VaultError {}
