// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error kinds shared across the binary's subcommands (§7).
//!
//! Each component keeps its own narrow error enum at its boundary
//! (`VaultError`, `StoreError`, `SelectorError`, ...); this type is the
//! coarser classification the binary maps them onto when building the
//! human-readable summary or the JSON failure envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NoAuthFiles,
    NoSuchProfile,
    PartialProfile,
    ReservedName,
    NoProfiles,
    AllBlocked,
    CooldownActive,
    PatternTimeout,
    HandoffTimeout,
    IOError,
    StoreError,
    NotSupported,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAuthFiles => "no_auth_files",
            Self::NoSuchProfile => "no_such_profile",
            Self::PartialProfile => "partial_profile",
            Self::ReservedName => "reserved_name",
            Self::NoProfiles => "no_profiles",
            Self::AllBlocked => "all_blocked",
            Self::CooldownActive => "cooldown_active",
            Self::PatternTimeout => "pattern_timeout",
            Self::HandoffTimeout => "handoff_timeout",
            Self::IOError => "io_error",
            Self::StoreError => "store_error",
            Self::NotSupported => "not_supported",
            Self::Cancelled => "cancelled",
        }
    }

    /// Exit code exposed to callers of the `run` path (§6): `2` when the
    /// supervisor exhausts its candidates under rate limits, `1` for
    /// other non-recoverable failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoProfiles | Self::AllBlocked | Self::HandoffTimeout | Self::CooldownActive => 2,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure envelope: `{success:false, command, error:{code,
/// message, details?}, suggestions?}` per §7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub success: bool,
    pub command: String,
    pub error: FailureDetail,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl FailureEnvelope {
    pub fn new(command: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            command: command.into(),
            error: FailureDetail { code: code.as_str().to_owned(), message: message.into(), details: None },
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
