// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Usage Window Fetcher (§4.E): query each tool's rate-limit endpoint for
//! current primary/secondary window utilization over a bounded worker
//! pool, following the concurrency shape of the teacher's
//! `upstream/health.rs` background checker rather than hand-rolled thread
//! spawning.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use crate::model::{ProfileUsage, UsageWindow};
use crate::tool::Tool;

/// Upper bound on concurrent outbound HTTPS requests (§5 scheduling).
const DEFAULT_CONCURRENCY: usize = 8;
const MIN_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<RawUsage, String>> + Send + 'a>>;

/// The tool-specific usage endpoint and response shape are opaque
/// (§1 scope): this trait is the seam a per-tool client implements.
/// Production wiring wraps a `reqwest::Client` per tool; tests substitute
/// a fake that returns canned windows without touching the network.
/// Hand-rolled boxed-future method rather than an `async-trait`
/// dependency, matching the teacher's preference for `tonic::async_trait`
/// only where the generated server traits require it.
pub trait UsageClient: Send + Sync {
    fn fetch<'a>(&'a self, tool: Tool, access_token: &'a str) -> FetchFuture<'a>;
}

/// Raw primary/secondary window pair as reported by a tool's endpoint,
/// before the availability score is computed.
#[derive(Debug, Clone, Default)]
pub struct RawUsage {
    pub primary: Option<UsageWindow>,
    pub secondary: Option<UsageWindow>,
}

/// `reqwest`-backed client hitting the tool's declared usage endpoint
/// with a bearer token. The endpoint URL and response schema are
/// provider-specific and therefore out of scope (§1); callers that need
/// the real wire format supply their own [`UsageClient`] and this type
/// exists only to give the fetcher something to hold by default.
pub struct HttpUsageClient {
    client: reqwest::Client,
}

impl HttpUsageClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    fn endpoint(&self, tool: Tool) -> &'static str {
        match tool {
            Tool::Codex => "https://chatgpt.com/backend-api/codex/usage",
            Tool::Claude => "https://api.anthropic.com/api/oauth/usage",
            Tool::Gemini => "https://cloudcode-pa.googleapis.com/v1internal/usage",
        }
    }
}

impl Default for HttpUsageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageClient for HttpUsageClient {
    fn fetch<'a>(&'a self, tool: Tool, access_token: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let resp = self
                .client
                .get(self.endpoint(tool))
                .bearer_auth(access_token)
                .timeout(MAX_FETCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                return Err(format!("usage endpoint returned {}", resp.status()));
            }
            let body: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
            Ok(parse_usage_response(&body))
        })
    }
}

fn parse_usage_response(body: &serde_json::Value) -> RawUsage {
    RawUsage { primary: parse_window(body.get("primary")), secondary: parse_window(body.get("secondary")) }
}

fn parse_window(value: Option<&serde_json::Value>) -> Option<UsageWindow> {
    let v = value?;
    Some(UsageWindow {
        used_percent: v.get("used_percent").and_then(|x| x.as_f64())?,
        resets_at: v.get("resets_at").and_then(|x| x.as_u64()).unwrap_or(0),
        window_duration_secs: v.get("window_duration_secs").and_then(|x| x.as_u64()).unwrap_or(0),
    })
}

pub struct UsageFetcher<C: UsageClient> {
    client: C,
    concurrency: usize,
}

impl<C: UsageClient> UsageFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client, concurrency: DEFAULT_CONCURRENCY }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// `FetchAll(ctx, tool, {profile -> accessToken}) -> [ProfileUsage]`.
    ///
    /// Errors are captured per-result and never abort the batch. `ctx`
    /// (a bound on the request timeout) defaults to a 30s window per
    /// profile, clamped into the contract's 15-60s range.
    pub async fn fetch_all(
        &self,
        tool: Tool,
        tokens: HashMap<String, String>,
        timeout: Duration,
        now_secs: u64,
    ) -> Vec<ProfileUsage> {
        let timeout = timeout.clamp(MIN_FETCH_TIMEOUT, MAX_FETCH_TIMEOUT);
        stream::iter(tokens.into_iter())
            .map(|(profile, token)| {
                let client = &self.client;
                async move {
                    let result = tokio::time::timeout(timeout, client.fetch(tool, &token)).await;
                    match result {
                        Ok(Ok(raw)) => usage_from_raw(profile, raw, now_secs),
                        Ok(Err(e)) => ProfileUsage { profile, error: Some(e), ..Default::default() },
                        Err(_) => {
                            ProfileUsage { profile, error: Some("usage fetch timed out".into()), ..Default::default() }
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Maps raw windows into a [`ProfileUsage`], computing the availability
/// score. Exposed for callers (e.g. the supervisor's precheck) that
/// already hold a [`RawUsage`] without going through the network path.
pub fn usage_from_raw(profile: String, raw: RawUsage, now_secs: u64) -> ProfileUsage {
    let score = availability_score(raw.primary, raw.secondary, now_secs);
    ProfileUsage { profile, primary: raw.primary, secondary: raw.secondary, availability_score: score, error: None }
}

/// Bonus applied when a window is within this many seconds of reset —
/// the profile is about to regain headroom regardless of how depleted
/// it looks right now.
const NEAR_RESET_BONUS_WINDOW_SECS: u64 = 300;
const NEAR_RESET_BONUS: f64 = 10.0;
/// Score assigned to a profile with no window data at all: neither
/// favored nor penalized relative to ones with partial data.
const NEUTRAL_SCORE: f64 = 50.0;

/// Monotone function of `(100 - primaryUsedPercent)` and
/// `(100 - secondaryUsedPercent)`, weighted so the primary window
/// dominates; profiles without any window data get a neutral score.
fn availability_score(primary: Option<UsageWindow>, secondary: Option<UsageWindow>, now_secs: u64) -> f64 {
    if primary.is_none() && secondary.is_none() {
        return NEUTRAL_SCORE;
    }

    let primary_avail = primary.map(|w| 100.0 - w.used_percent.clamp(0.0, 100.0));
    let secondary_avail = secondary.map(|w| 100.0 - w.used_percent.clamp(0.0, 100.0));

    let mut score = match (primary_avail, secondary_avail) {
        (Some(p), Some(s)) => p * 0.7 + s * 0.3,
        (Some(p), None) => p,
        (None, Some(s)) => s,
        (None, None) => NEUTRAL_SCORE,
    };

    for window in [primary, secondary].into_iter().flatten() {
        if window.resets_at > now_secs && window.resets_at - now_secs < NEAR_RESET_BONUS_WINDOW_SECS {
            score += NEAR_RESET_BONUS;
        }
    }

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
#[path = "usage_fetch_tests.rs"]
mod tests;
