// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator tunables, following `MuxConfig`'s plain-struct-with-defaults
//! convention rather than a second `clap::Parser` — the coordinator is a
//! library consumed by the supervisor, not its own binary.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the poll loop re-reads each tracked surface (§4.I `Start`).
    pub poll_interval: Duration,
    /// Per-state timeout before a tracker resets to `Failed` then `Idle`.
    pub state_timeout: Duration,
    /// Case-insensitive substrings that mark a pane's most recent output
    /// delta as a rate-limit hit (`Idle → RateLimited`). Tool-specific
    /// regex detection (§4.H) lives in the Session Supervisor's own
    /// `RateLimitPatterns`; this generic fallback only covers hosts that
    /// track panes without wiring their own detector through
    /// [`crate::coordinator::AuthCoordinator::mark_rate_limited`].
    pub rate_limit_patterns: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            state_timeout: Duration::from_secs(30),
            rate_limit_patterns: vec![
                "usage limit".to_string(),
                "rate limit".to_string(),
                "quota exceeded".to_string(),
                "too many requests".to_string(),
            ],
        }
    }
}
