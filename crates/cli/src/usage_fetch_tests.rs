// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

struct FakeClient {
    responses: HashMap<String, Result<RawUsage, String>>,
}

impl UsageClient for FakeClient {
    fn fetch<'a>(&'a self, _tool: Tool, access_token: &'a str) -> FetchFuture<'a> {
        let result = self.responses.get(access_token).cloned();
        Box::pin(async move { result.unwrap_or_else(|| Err("no such token".into())) })
    }
}

fn window(used_percent: f64, resets_at: u64) -> UsageWindow {
    UsageWindow { used_percent, resets_at, window_duration_secs: 3600 }
}

#[tokio::test]
async fn fetch_all_never_aborts_on_single_error() {
    let mut responses = HashMap::new();
    responses.insert("good".to_string(), Ok(RawUsage { primary: Some(window(10.0, 0)), secondary: None }));
    responses.insert("bad".to_string(), Err("boom".to_string()));
    let fetcher = UsageFetcher::new(FakeClient { responses });

    let mut tokens = HashMap::new();
    tokens.insert("work".to_string(), "good".to_string());
    tokens.insert("broken".to_string(), "bad".to_string());

    let results = fetcher.fetch_all(Tool::Codex, tokens, Duration::from_secs(5), 1000).await;
    assert_eq!(results.len(), 2);

    let work = results.iter().find(|r| r.profile == "work").unwrap();
    assert!(work.error.is_none());
    assert!(work.availability_score > 50.0);

    let broken = results.iter().find(|r| r.profile == "broken").unwrap();
    assert_eq!(broken.error.as_deref(), Some("boom"));
    assert_eq!(broken.availability_score, 0.0);
}

#[test]
fn availability_score_is_neutral_without_window_data() {
    assert_eq!(availability_score(None, None, 1000), NEUTRAL_SCORE);
}

#[test]
fn availability_score_prefers_least_used() {
    let low = availability_score(Some(window(10.0, 0)), None, 1000);
    let high = availability_score(Some(window(90.0, 0)), None, 1000);
    assert!(low > high);
}

#[test]
fn availability_score_applies_near_reset_bonus() {
    let far = availability_score(Some(window(90.0, 100_000)), None, 1000);
    let near = availability_score(Some(window(90.0, 1100)), None, 1000);
    assert!(near > far);
}

#[test]
fn availability_score_clamped_to_100() {
    let score = availability_score(Some(window(0.0, 1100)), Some(window(0.0, 1100)), 1000);
    assert!(score <= 100.0);
}
