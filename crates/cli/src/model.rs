// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared data-model types (§3). Every type here round-trips through
//! `serde_json` at persistence boundaries (state-store rows, `meta.json`
//! sidecars) the way `event.rs`/`event_log.rs` do, using `u64`
//! millisecond epoch timestamps rather than `chrono::DateTime` — the
//! teacher's own code never reaches for `chrono`.

use serde::{Deserialize, Serialize};

use crate::tool::Tool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub tool: Tool,
    pub profile: String,
    pub hit_at: u64,
    pub cooldown_until: u64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageWindow {
    pub used_percent: f64,
    pub resets_at: u64,
    pub window_duration_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUsage {
    pub profile: String,
    pub primary: Option<UsageWindow>,
    pub secondary: Option<UsageWindow>,
    pub availability_score: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapSession {
    pub id: String,
    pub tool: Tool,
    pub profile: String,
    pub started_at: u64,
    pub duration_seconds: Option<u64>,
    pub exit_code: Option<i32>,
    pub rate_limit_hit: bool,
    pub estimated_cost_cents: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityEventType {
    Activate,
    Deactivate,
    CooldownSet,
    CooldownClear,
    Refresh,
    HandoffFailed,
}

impl ActivityEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityEventType::Activate => "activate",
            ActivityEventType::Deactivate => "deactivate",
            ActivityEventType::CooldownSet => "cooldown_set",
            ActivityEventType::CooldownClear => "cooldown_clear",
            ActivityEventType::Refresh => "refresh",
            ActivityEventType::HandoffFailed => "handoff_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: u64,
    pub event_type: ActivityEventType,
    pub tool: Tool,
    pub profile: String,
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRate {
    pub tool: Tool,
    pub cents_per_minute: f64,
    pub cents_per_session: f64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityCacheRow {
    pub tool: Tool,
    pub profile: String,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub plan_type: Option<String>,
    pub account_id: Option<String>,
    pub expires_at: Option<u64>,
    pub fetched_at: u64,
}
