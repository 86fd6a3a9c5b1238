// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-pane tracker and wire types (§4.I), mirroring the teacher's
//! `SessionEntry`/`PendingAuth` shapes minus their network fields.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneState {
    Idle,
    RateLimited,
    AwaitingMethodSelect,
    AwaitingUrl,
    AuthPending,
    CodeReceived,
    AwaitingConfirm,
    Resuming,
    Failed,
}

impl PaneState {
    pub fn as_str(self) -> &'static str {
        match self {
            PaneState::Idle => "idle",
            PaneState::RateLimited => "rate_limited",
            PaneState::AwaitingMethodSelect => "awaiting_method_select",
            PaneState::AwaitingUrl => "awaiting_url",
            PaneState::AuthPending => "auth_pending",
            PaneState::CodeReceived => "code_received",
            PaneState::AwaitingConfirm => "awaiting_confirm",
            PaneState::Resuming => "resuming",
            PaneState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// `AuthRequest := { id, paneId, url, createdAt, status }` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub id: String,
    pub pane_id: String,
    pub url: String,
    pub created_at: u64,
    pub status: AuthRequestStatus,
}

/// `AuthResponse := { requestId, code, account, error? }` (§6). The
/// agent that produces this is out of scope; the coordinator only
/// consumes it via `ReceiveAuthResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub request_id: String,
    pub code: String,
    pub account: String,
    pub error: Option<String>,
}

/// `PaneTracker = {paneId, state, lastOutput, lastStateChange, oauthUrl?,
/// requestId?, receivedCode?, usedAccount?, errorMessage?}` (§4.I).
#[derive(Debug, Clone)]
pub struct PaneTracker {
    pub pane_id: String,
    pub state: PaneState,
    pub last_output: String,
    pub last_state_change: u64,
    pub oauth_url: Option<String>,
    pub request_id: Option<String>,
    pub received_code: Option<String>,
    pub used_account: Option<String>,
    pub error_message: Option<String>,
}

impl PaneTracker {
    pub fn new(pane_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            pane_id: pane_id.into(),
            state: PaneState::Idle,
            last_output: String::new(),
            last_state_change: now_ms,
            oauth_url: None,
            request_id: None,
            received_code: None,
            used_account: None,
            error_message: None,
        }
    }

    pub fn transition(&mut self, next: PaneState, now_ms: u64) {
        self.state = next;
        self.last_state_change = now_ms;
    }

    /// `* → Failed → Idle` reset after a bounded interval (§4.I
    /// invariants); clears per-attempt fields so the next rate-limit
    /// detection starts from a clean tracker.
    pub fn reset_to_idle(&mut self, now_ms: u64) {
        self.oauth_url = None;
        self.request_id = None;
        self.received_code = None;
        self.used_account = None;
        self.error_message = None;
        self.transition(PaneState::Idle, now_ms);
    }

    pub fn is_timed_out(&self, now_ms: u64, timeout_ms: u64) -> bool {
        self.state != PaneState::Idle && now_ms.saturating_sub(self.last_state_change) >= timeout_ms
    }
}
