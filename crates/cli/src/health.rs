// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health Evaluator (§4.C): derive a profile's health status from token
//! expiry, recent error counts, and a geometrically decaying penalty.
//!
//! Thresholds follow the env-var-tunable style of the teacher's
//! `profile.rs` (`env_u64`/`env_u32`), generalized to `VAULT_HEALTH_*`.

use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u64 = 86_400;
const DEFAULT_WARNING_EXPIRY_SECS: u64 = SECONDS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Computed view over a profile, as of `now`.
#[derive(Debug, Clone, Copy)]
pub struct ProfileHealth {
    pub token_expires_at: Option<u64>,
    pub error_count_1h: u32,
    pub penalty_score: f64,
    pub last_used_at: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub error_count_warning: u32,
    pub error_count_critical: u32,
    pub warning_expiry_secs: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            error_count_warning: env_u32("VAULT_HEALTH_ERROR_WARNING", 3),
            error_count_critical: env_u32("VAULT_HEALTH_ERROR_CRITICAL", 8),
            warning_expiry_secs: env_u64("VAULT_HEALTH_WARNING_EXPIRY_SECS", DEFAULT_WARNING_EXPIRY_SECS),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `CalculateStatus(h) -> HealthStatus`.
pub fn calculate_status(h: &ProfileHealth, now_secs: u64, thresholds: &HealthThresholds) -> HealthStatus {
    let expired = h.token_expires_at.is_some_and(|exp| exp <= now_secs);
    if expired || h.error_count_1h >= thresholds.error_count_critical {
        return HealthStatus::Critical;
    }

    let expiring_soon =
        h.token_expires_at.is_some_and(|exp| exp.saturating_sub(now_secs) <= thresholds.warning_expiry_secs);
    if expiring_soon || h.error_count_1h >= thresholds.error_count_warning {
        return HealthStatus::Warning;
    }

    if h.token_expires_at.is_none() && h.last_used_at.is_none() {
        return HealthStatus::Unknown;
    }

    HealthStatus::Healthy
}

/// `FormatHealthStatus(status, h, opts) -> String` — a one-line
/// human-readable summary.
pub fn format_health_status(status: HealthStatus, h: &ProfileHealth, now_secs: u64) -> String {
    let expiry = match h.token_expires_at {
        Some(exp) if exp > now_secs => format!("expires in {}s", exp - now_secs),
        Some(_) => "expired".to_owned(),
        None => "no expiry data".to_owned(),
    };
    format!("{status} ({expiry}, {} errors/1h, penalty {:.1})", h.error_count_1h, h.penalty_score)
}

/// Penalty decays geometrically with time: `p <- p * r^(elapsed /
/// half_life)`. Computed lazily on read, no background ticker.
pub fn decay_penalty(penalty_at_last_update: f64, elapsed_secs: f64, half_life_secs: f64, r: f64) -> f64 {
    if half_life_secs <= 0.0 {
        return penalty_at_last_update;
    }
    penalty_at_last_update * r.powf(elapsed_secs / half_life_secs)
}

/// Apply one failure event to a running penalty score (used by the
/// supervisor on rate-limit/refresh-error observations).
pub fn apply_failure_penalty(current: f64, increment: f64) -> f64 {
    current + increment
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
