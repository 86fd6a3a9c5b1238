// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-written domain error for the supervisor boundary (§7.1), closed
//! over the failure kinds the `Init..Finalize` state machine can reach.

use std::fmt;

use crate::pty::PtyError;
use crate::selector::SelectorError;
use crate::store::StoreError;
use crate::vault::VaultError;

#[derive(Debug)]
pub enum SupervisorError {
    NoProfiles,
    AllBlocked,
    CooldownActive { profile: String, retry_after_secs: u64 },
    PatternTimeout(String),
    HandoffTimeout,
    MethodSelectAmbiguous { profile: String },
    NotSupported,
    Cancelled,
    IoError(String),
    StoreError(String),
}

impl SupervisorError {
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::NoProfiles => "no_profiles",
            SupervisorError::AllBlocked => "all_blocked",
            SupervisorError::CooldownActive { .. } => "cooldown_active",
            SupervisorError::PatternTimeout(_) => "pattern_timeout",
            SupervisorError::HandoffTimeout => "handoff_timeout",
            SupervisorError::MethodSelectAmbiguous { .. } => "method_select_ambiguous",
            SupervisorError::NotSupported => "not_supported",
            SupervisorError::Cancelled => "cancelled",
            SupervisorError::IoError(_) => "io_error",
            SupervisorError::StoreError(_) => "store_error",
        }
    }

    /// Exit code policy (§6): `2` when the supervisor exhausts its
    /// candidates or a handoff stalls; `1` for other failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::NoProfiles
            | SupervisorError::AllBlocked
            | SupervisorError::CooldownActive { .. }
            | SupervisorError::PatternTimeout(_)
            | SupervisorError::MethodSelectAmbiguous { .. }
            | SupervisorError::HandoffTimeout => 2,
            SupervisorError::Cancelled => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::NoProfiles => write!(f, "no profiles are available for this tool"),
            SupervisorError::AllBlocked => write!(f, "every candidate profile is in an active cooldown"),
            SupervisorError::CooldownActive { profile, retry_after_secs } => {
                write!(f, "profile {profile} is in cooldown for another {retry_after_secs}s")
            }
            SupervisorError::PatternTimeout(what) => write!(f, "timed out waiting for {what}"),
            SupervisorError::HandoffTimeout => write!(f, "auth handoff timed out"),
            SupervisorError::MethodSelectAmbiguous { profile } => {
                write!(f, "cannot confidently map profile {profile}'s auth mode to a method-select choice")
            }
            SupervisorError::NotSupported => write!(f, "pseudo-terminals are not supported on this platform"),
            SupervisorError::Cancelled => write!(f, "supervisor run was cancelled"),
            SupervisorError::IoError(msg) => write!(f, "io error: {msg}"),
            SupervisorError::StoreError(msg) => write!(f, "state store error: {msg}"),
        }
    }
}

impl std::error::Error for SupervisorError {}

impl From<VaultError> for SupervisorError {
    fn from(e: VaultError) -> Self {
        SupervisorError::IoError(e.to_string())
    }
}

impl From<SelectorError> for SupervisorError {
    fn from(e: SelectorError) -> Self {
        match e {
            SelectorError::NoProfiles => SupervisorError::NoProfiles,
            SelectorError::AllBlocked => SupervisorError::AllBlocked,
        }
    }
}

impl From<PtyError> for SupervisorError {
    fn from(e: PtyError) -> Self {
        match e {
            PtyError::NotSupported => SupervisorError::NotSupported,
            PtyError::Timeout => SupervisorError::PatternTimeout("pty pattern".to_string()),
            PtyError::Cancelled => SupervisorError::Cancelled,
            PtyError::Io(msg) => SupervisorError::IoError(msg),
        }
    }
}

impl From<StoreError> for SupervisorError {
    fn from(e: StoreError) -> Self {
        SupervisorError::StoreError(e.to_string())
    }
}
