// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Supervisor (§4.H): drives a PTY-wrapped tool through its
//! lifecycle — select a profile, activate it, run until idle or rate
//! limited, rotate to an alternate profile on a limit hit, drive the
//! re-login handoff, and resume the user's prompt in the same PTY.
//!
//! `RunUntilIdle`'s multiplexing of PTY output against pattern
//! detection and cancellation is the direct generalization of
//! `session/run.rs::Session::run`'s `tokio::select!` loop; `Cooldown →
//! SelectAlt`'s call into the selector with a scheduled retry on
//! exhaustion is the direct generalization of
//! `session/transition.rs::handle_rate_limit`.

pub mod candidates;
pub mod error;

pub use error::SupervisorError;

use std::path::PathBuf;
use std::time::Duration;

use regex::bytes::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::health::HealthThresholds;
use crate::identity;
use crate::model::{ActivityEvent, ActivityEventType, CostRate, WrapSession};
use crate::pty::{PtyController, PtyError};
use crate::selector::{Algorithm, Selector};
use crate::store::Store;
use crate::tool::{RateLimitPatterns, Tool};
use crate::usage_fetch::{UsageClient, UsageFetcher};
use crate::vault::Vault;

/// A successfully-started child's working parameters, resolved once at
/// `StartPTY` and reused across every handoff in the wrap session.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub tool: Tool,
    pub extra_args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub resume_text: String,
}

impl RunRequest {
    pub fn new(tool: Tool) -> Self {
        Self { tool, extra_args: Vec::new(), cwd: None, resume_text: "continue".to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct WrapOutcome {
    pub exit_code: i32,
    pub handoffs: u32,
    pub final_profile: Option<String>,
}

/// Builds the PTY command line: the tool's default binary plus
/// whatever arguments the user passed through (§4.H `StartPTY`).
fn build_command(tool: Tool, extra_args: &[String]) -> Vec<String> {
    let mut command = vec![tool.default_binary().to_string()];
    command.extend(extra_args.iter().cloned());
    command
}

/// Environment overlay applied on top of the inherited process
/// environment. `Restore` already placed the right bytes at the tool's
/// real auth-file paths, so the overlay only needs to carry UX hints
/// (§4.H `StartPTY`) — never credentials themselves.
fn build_env_overlay(config: &Config, browser_hint: Option<&str>) -> Vec<(String, String)> {
    let mut env = Vec::new();
    if let Some(hint) = browser_hint.or(config.browser_profile.as_deref()) {
        env.push(("BROWSER".to_string(), hint.to_string()));
    }
    env
}

/// `MaxRetries` cap on handoffs per wrap session (§4.H "Per-iteration
/// budgets").
fn retry_budget_exhausted(handoffs: u32, max_retries: u32) -> bool {
    handoffs >= max_retries
}

/// Rough cost estimate for a closed wrap session from the tool's
/// configured cost rate, if any.
fn estimate_cost_cents(rate: Option<&CostRate>, duration_secs: u64) -> Option<f64> {
    let rate = rate?;
    let minutes = duration_secs as f64 / 60.0;
    Some(rate.cents_per_session + rate.cents_per_minute * minutes)
}

fn activity_event(now_ms: u64, event_type: ActivityEventType, tool: Tool, profile: &str, note: Option<&str>) -> ActivityEvent {
    let mut details = serde_json::Map::new();
    if let Some(note) = note {
        details.insert("note".to_string(), serde_json::Value::String(note.to_string()));
    }
    ActivityEvent { timestamp: now_ms, event_type, tool, profile: profile.to_string(), details }
}

/// Dependencies the supervisor needs, bundled so `run_wrap_session`
/// doesn't take a dozen parameters. Borrowing rather than owning keeps
/// this cheap to construct per invocation from `main`.
pub struct Supervisor<'a, C: UsageClient> {
    pub config: &'a Config,
    pub store: &'a Store,
    pub vault: &'a Vault,
    pub selector: &'a Selector,
    pub usage_fetcher: Option<&'a UsageFetcher<C>>,
    pub clock: SharedClock,
}

impl<'a, C: UsageClient> Supervisor<'a, C> {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn now_secs(&self) -> u64 {
        self.now_ms() / 1000
    }

    /// Runs one full wrap session: `Init` through `Finalize`.
    pub async fn run_wrap_session(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<WrapOutcome, SupervisorError> {
        let tool = request.tool;

        // Init: prime the original-state backup so an uninstall can
        // always recover what the user had before this tool ever
        // touched their credentials.
        self.vault.backup_original(tool)?;
        if let Some(auto_name) = self.vault.backup_current(tool)? {
            self.vault.rotate_auto_backups(tool, 5)?;
            info!(tool = tool.tag(), profile = %auto_name, "captured pre-run auto-backup");
        }

        let algorithm = Algorithm::parse(&self.config.algorithm).unwrap_or(Algorithm::Smart);
        let mut excluded: Vec<String> = Vec::new();
        let mut handoffs: u32 = 0;
        let started_at = self.now_ms();
        let mut rate_limit_hit = false;

        // SelectProfile
        let mut active_profile = self.select_profile(tool, algorithm, &excluded, None).await?;
        self.precheck_and_maybe_reselect(tool, algorithm, &mut active_profile, &mut excluded).await?;

        // Activate
        self.activate(tool, &active_profile).await?;

        // StartPTY — one child process for the whole wrap session;
        // handoffs below reuse this same PTY rather than restarting it
        // (§4.H `InjectLoginFlow`: "without tearing down the PTY").
        let mut pty = self.start_pty(request).await?;
        let patterns = RateLimitPatterns::for_tool(tool);

        loop {
            // RunUntilIdle
            match self.run_until_idle(&mut pty, &patterns, cancel).await? {
                IdleOutcome::Exited(status) => {
                    pty.close().await.ok();
                    let exit_code = status.code.unwrap_or(if status.signal.is_some() { 1 } else { 0 });
                    self.finalize(tool, &active_profile, started_at, exit_code, rate_limit_hit).await?;
                    return Ok(WrapOutcome { exit_code, handoffs, final_profile: Some(active_profile) });
                }
                IdleOutcome::RateLimited => {
                    rate_limit_hit = true;
                }
                IdleOutcome::Cancelled => {
                    pty.signal(crate::event::PtySignal::Int).ok();
                    pty.close().await.ok();
                    self.finalize(tool, &active_profile, started_at, 130, rate_limit_hit).await?;
                    return Err(SupervisorError::Cancelled);
                }
            }

            // Cooldown
            self.cooldown(tool, &active_profile).await?;
            excluded.push(active_profile.clone());

            if retry_budget_exhausted(handoffs, self.config.max_retries) {
                pty.close().await.ok();
                self.finalize(tool, &active_profile, started_at, 2, rate_limit_hit).await?;
                return Err(SupervisorError::AllBlocked);
            }

            // SelectAlt
            let replacement = match self.select_profile(tool, algorithm, &excluded, Some(&active_profile)).await {
                Ok(p) => p,
                Err(e) => {
                    pty.close().await.ok();
                    self.finalize(tool, &active_profile, started_at, 2, rate_limit_hit).await?;
                    return Err(e);
                }
            };

            // InjectLoginFlow + DriveHandoff (single-pane, no external
            // Auth Coordinator wired in-process here — a caller that
            // needs multi-pane handoff drives this via `crates/mux`
            // instead and supplies the exchange code out of band).
            match self.inject_login_flow(tool, &replacement, &mut pty, cancel).await {
                Ok(()) => {}
                Err(e) => {
                    pty.close().await.ok();
                    self.emit_handoff_failed(tool, &replacement, "login flow injection failed").await;
                    self.finalize(tool, &active_profile, started_at, 2, rate_limit_hit).await?;
                    return Err(e);
                }
            }

            self.activate(tool, &replacement).await?;
            handoffs += 1;

            // ResumePrompt
            pty.inject_command(&request.resume_text).await?;
            active_profile = replacement;
        }
    }

    async fn select_profile(
        &self,
        tool: Tool,
        algorithm: Algorithm,
        excluded: &[String],
        current: Option<&str>,
    ) -> Result<String, SupervisorError> {
        let thresholds = HealthThresholds::default();
        let all = candidates::gather(self.vault, self.store, tool, self.now_secs(), &thresholds).await?;
        let eligible: Vec<_> = all.into_iter().filter(|c| !excluded.contains(&c.profile)).collect();
        if eligible.is_empty() {
            return Err(SupervisorError::NoProfiles);
        }
        let outcome = self.selector.select(algorithm, &eligible, current, self.now_secs(), false, false)?;
        Ok(outcome.selected)
    }

    /// Optional usage precheck (§4.H): if the chosen candidate's
    /// primary window is already past the configured threshold, ask
    /// the selector again with live usage data folded in.
    async fn precheck_and_maybe_reselect(
        &self,
        tool: Tool,
        algorithm: Algorithm,
        active_profile: &mut String,
        excluded: &mut [String],
    ) -> Result<(), SupervisorError> {
        let (Some(fetcher), true) = (self.usage_fetcher, self.config.precheck) else {
            return Ok(());
        };

        let profile_dir = self.vault.profile_path(tool, active_profile);
        let Some(token) = identity::extract_access_token(&profile_dir, tool) else {
            return Ok(());
        };

        let mut tokens = std::collections::HashMap::new();
        tokens.insert(active_profile.clone(), token);
        let results = fetcher.fetch_all(tool, tokens, Duration::from_secs(30), self.now_secs()).await;
        let Some(usage) = results.into_iter().next() else {
            return Ok(());
        };
        let Some(primary) = usage.primary else {
            return Ok(());
        };

        if primary.used_percent / 100.0 >= self.config.precheck_threshold {
            warn!(tool = tool.tag(), profile = %active_profile, used_percent = primary.used_percent, "precheck flagged high usage, reselecting");
            let thresholds = HealthThresholds::default();
            let mut all = candidates::gather(self.vault, self.store, tool, self.now_secs(), &thresholds).await?;
            for c in &mut all {
                if c.profile == *active_profile {
                    c.usage = Some(usage.clone());
                }
            }
            let eligible: Vec<_> = all.into_iter().filter(|c| !excluded.contains(&c.profile)).collect();
            if let Ok(outcome) = self.selector.select(algorithm, &eligible, Some(active_profile), self.now_secs(), false, true) {
                *active_profile = outcome.selected;
            }
        }
        Ok(())
    }

    async fn activate(&self, tool: Tool, profile: &str) -> Result<(), SupervisorError> {
        self.vault.restore(tool, profile)?;
        self.log_activate(tool, profile).await?;
        self.refresh_identity_cache(tool, profile).await;
        Ok(())
    }

    async fn log_activate(&self, tool: Tool, profile: &str) -> Result<(), SupervisorError> {
        let event = activity_event(self.now_ms(), ActivityEventType::Activate, tool, profile, None);
        self.store.log_event(event).await?;
        Ok(())
    }

    /// Keeps the identity cache warm so the next `candidates::gather`
    /// call has a fresh `token_expires_at` without re-parsing auth
    /// files on every selection pass. Best-effort: a failed extraction
    /// just leaves the prior cached row (or none) in place.
    async fn refresh_identity_cache(&self, tool: Tool, profile: &str) {
        let Some(row) = candidates::refresh_identity_cache_row(self.vault, tool, profile, self.now_secs()) else {
            return;
        };
        if let Err(e) = self.store.cache_identity(row).await {
            warn!(error = %e, tool = tool.tag(), profile, "failed to refresh identity cache");
        }
    }

    async fn start_pty(&self, request: &RunRequest) -> Result<PtyController, SupervisorError> {
        let command = build_command(request.tool, &request.extra_args);
        let env = build_env_overlay(self.config, None);
        let pty = PtyController::start(&command, self.config.cols, self.config.rows, request.cwd.as_deref(), &env).await?;
        Ok(pty)
    }

    /// `RunUntilIdle`: stream PTY output unmodified while feeding each
    /// chunk into the rate-limit detector; return as soon as a match
    /// fires, the child exits, or the caller cancels.
    async fn run_until_idle(
        &self,
        pty: &mut PtyController,
        patterns: &RateLimitPatterns,
        cancel: &CancellationToken,
    ) -> Result<IdleOutcome, SupervisorError> {
        // A single future (the timed read) borrows `pty` mutably at a
        // time; `wait()` is only ever awaited sequentially, after that
        // borrow has already been released, never concurrently with a
        // read — two concurrent borrows of the same PTY handle would
        // not satisfy the borrow checker.
        let idle_timeout = self.config.idle_timeout();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(IdleOutcome::Cancelled),
                chunk = tokio::time::timeout(idle_timeout, pty.read_output()) => {
                    match chunk {
                        Ok(Ok(bytes)) => {
                            if patterns.is_match(&bytes) {
                                return Ok(IdleOutcome::RateLimited);
                            }
                            if pty.eof() {
                                let status = pty.wait().await?;
                                return Ok(IdleOutcome::Exited(status));
                            }
                        }
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_elapsed) => {
                            // idle timeout: nothing new from the child, keep polling.
                        }
                    }
                }
            }
        }
    }

    async fn cooldown(&self, tool: Tool, profile: &str) -> Result<(), SupervisorError> {
        let now = self.now_secs();
        self.store
            .set_cooldown(tool, profile.to_string(), now, self.config.cooldown_secs, Some("rate limit detected".to_string()))
            .await?;
        let event = activity_event(self.now_ms(), ActivityEventType::CooldownSet, tool, profile, Some("rate limit detected"));
        self.store.log_event(event).await?;
        Ok(())
    }

    async fn emit_handoff_failed(&self, tool: Tool, profile: &str, reason: &str) {
        let event = activity_event(self.now_ms(), ActivityEventType::HandoffFailed, tool, profile, Some(reason));
        if let Err(e) = self.store.log_event(event).await {
            warn!(error = %e, "failed to log handoff-failed event");
        }
    }

    /// `InjectLoginFlow` + `DriveHandoff`, single-pane variant: issues
    /// `/login`, waits for the method-select prompt, injects the numeric
    /// choice matching the replacement profile's declared auth mode, and
    /// waits for the OAuth URL to appear. Handing the URL to an external
    /// agent and receiving the exchange code back is out of this
    /// method's scope (§4.I) — callers that need that wire it through
    /// `crates/mux`'s `AuthCoordinator` against this same PTY via a
    /// `SurfaceManager`.
    async fn inject_login_flow(
        &self,
        tool: Tool,
        replacement: &str,
        pty: &mut PtyController,
        cancel: &CancellationToken,
    ) -> Result<(), SupervisorError> {
        let state_timeout = self.config.state_timeout();
        let auth_timeout = self.config.auth_timeout();
        pty.inject_command(tool.login_command()).await?;

        let menu_pattern = Regex::new(tool.method_menu_pattern()).map_err(|e| SupervisorError::IoError(e.to_string()))?;
        let menu_text = tokio::select! {
            _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
            result = pty.wait_for_pattern(&menu_pattern, state_timeout) => result.map_err(|e| {
                if matches!(e, PtyError::Timeout) {
                    SupervisorError::PatternTimeout("method-select menu".to_string())
                } else {
                    SupervisorError::from(e)
                }
            })?,
        };

        // §9 Open Question 2: the mapping from auth mode to menu digit
        // is tool-specific and may drift; fail rather than guess when
        // the replacement's declared auth mode doesn't confidently
        // match an entry's label in the observed menu text.
        let auth_mode = self.vault.meta(tool, replacement).and_then(|m| m.auth_mode);
        let choice = auth_mode
            .as_deref()
            .and_then(|mode| tool.method_menu_entries().iter().find(|e| e.auth_mode == mode))
            .filter(|entry| Regex::new(entry.label_pattern).is_ok_and(|re| re.is_match(&menu_text)))
            .map(|entry| entry.choice)
            .ok_or_else(|| SupervisorError::MethodSelectAmbiguous { profile: replacement.to_string() })?;

        pty.inject_command(choice).await?;

        let url_pattern = Regex::new(r"https://\S+").map_err(|e| SupervisorError::IoError(e.to_string()))?;
        tokio::select! {
            _ = cancel.cancelled() => Err(SupervisorError::Cancelled),
            result = pty.wait_for_pattern(&url_pattern, auth_timeout) => {
                result.map(|_| ()).map_err(SupervisorError::from)
            }
        }
    }

    async fn finalize(
        &self,
        tool: Tool,
        profile: &str,
        started_at_ms: u64,
        exit_code: i32,
        rate_limit_hit: bool,
    ) -> Result<(), SupervisorError> {
        let now = self.now_ms();
        let duration_seconds = now.saturating_sub(started_at_ms) / 1000;
        let rate = self.store.get_cost_rate(tool).await?;
        let session = WrapSession {
            id: format!("{}-{}", tool.tag(), started_at_ms),
            tool,
            profile: profile.to_string(),
            started_at: started_at_ms,
            duration_seconds: Some(duration_seconds),
            exit_code: Some(exit_code),
            rate_limit_hit,
            estimated_cost_cents: estimate_cost_cents(rate.as_ref(), duration_seconds),
        };
        self.store.record_wrap_session(session).await?;
        let event = activity_event(now, ActivityEventType::Deactivate, tool, profile, None);
        self.store.log_event(event).await?;
        Ok(())
    }
}

enum IdleOutcome {
    Exited(crate::pty::ExitStatus),
    RateLimited,
    Cancelled,
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
