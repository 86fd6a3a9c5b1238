// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::ActivityEvent;
use crate::tool::Tool;

async fn open_temp() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("vaultkeeper.db"), None).await.unwrap();
    (store, dir)
}

#[tokio::test]
async fn set_then_active_cooldown_round_trips() {
    let (store, _dir) = open_temp().await;
    store.set_cooldown(Tool::Codex, "work".into(), 1000, 3600, Some("usage limit".into())).await.unwrap();

    let active = store.active_cooldown(Tool::Codex, "work", 1500).await.unwrap();
    assert!(active.is_some());
    assert_eq!(active.unwrap().cooldown_until, 4600);

    let expired = store.active_cooldown(Tool::Codex, "work", 9999).await.unwrap();
    assert!(expired.is_none());
}

#[tokio::test]
async fn set_cooldown_replaces_existing_active_record() {
    let (store, _dir) = open_temp().await;
    store.set_cooldown(Tool::Codex, "work".into(), 1000, 3600, None).await.unwrap();
    store.set_cooldown(Tool::Codex, "work".into(), 2000, 60, None).await.unwrap();

    let active = store.active_cooldown(Tool::Codex, "work", 2500).await.unwrap().unwrap();
    assert_eq!(active.hit_at, 2000);
    assert_eq!(active.cooldown_until, 2060);
}

#[tokio::test]
async fn clear_cooldown_removes_the_record() {
    let (store, _dir) = open_temp().await;
    store.set_cooldown(Tool::Claude, "personal".into(), 100, 500, None).await.unwrap();
    let removed = store.clear_cooldown(Tool::Claude, "personal".into()).await.unwrap();
    assert!(removed.is_some());
    assert!(store.active_cooldown(Tool::Claude, "personal", 200).await.unwrap().is_none());
}

#[tokio::test]
async fn list_active_cooldowns_orders_by_cooldown_until() {
    let (store, _dir) = open_temp().await;
    store.set_cooldown(Tool::Codex, "b".into(), 100, 500, None).await.unwrap();
    store.set_cooldown(Tool::Codex, "a".into(), 100, 100, None).await.unwrap();

    let active = store.list_active_cooldowns(150).await.unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].profile, "a");
    assert_eq!(active[1].profile, "b");
}

#[tokio::test]
async fn wrap_sessions_and_cost_summary_aggregate() {
    let (store, _dir) = open_temp().await;
    store
        .record_wrap_session(WrapSession {
            id: "s1".into(),
            tool: Tool::Gemini,
            profile: "work".into(),
            started_at: 1000,
            duration_seconds: Some(120),
            exit_code: Some(0),
            rate_limit_hit: false,
            estimated_cost_cents: Some(5.0),
        })
        .await
        .unwrap();
    store
        .record_wrap_session(WrapSession {
            id: "s2".into(),
            tool: Tool::Gemini,
            profile: "work".into(),
            started_at: 2000,
            duration_seconds: Some(60),
            exit_code: Some(1),
            rate_limit_hit: true,
            estimated_cost_cents: Some(2.5),
        })
        .await
        .unwrap();

    let summary = store.get_cost_summary(Some(Tool::Gemini), None).await.unwrap();
    assert_eq!(summary.session_count, 2);
    assert_eq!(summary.total_duration_seconds, 180);
    assert!((summary.estimated_cost_cents - 7.5).abs() < f64::EPSILON);

    let sessions = store.get_wrap_sessions(Some(Tool::Gemini), None, 10).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].started_at, 2000);
}

#[tokio::test]
async fn cost_rate_round_trips() {
    let (store, _dir) = open_temp().await;
    assert!(store.get_cost_rate(Tool::Claude).await.unwrap().is_none());
    store
        .set_cost_rate(CostRate { tool: Tool::Claude, cents_per_minute: 1.2, cents_per_session: 20.0, updated_at: 42 })
        .await
        .unwrap();
    let rate = store.get_cost_rate(Tool::Claude).await.unwrap().unwrap();
    assert_eq!(rate.cents_per_minute, 1.2);
}

#[tokio::test]
async fn identity_cache_round_trips() {
    let (store, _dir) = open_temp().await;
    store
        .cache_identity(IdentityCacheRow {
            tool: Tool::Codex,
            profile: "work".into(),
            email: Some("a@example.com".into()),
            organization: None,
            plan_type: Some("pro".into()),
            account_id: Some("acct_1".into()),
            expires_at: Some(9999),
            fetched_at: 1234,
        })
        .await
        .unwrap();

    let cached = store.get_cached_identity(Tool::Codex, "work").await.unwrap().unwrap();
    assert_eq!(cached.email.as_deref(), Some("a@example.com"));
    assert_eq!(cached.plan_type.as_deref(), Some("pro"));
}

#[tokio::test]
async fn log_event_is_queryable_via_list_recent_events() {
    let (store, _dir) = open_temp().await;
    store
        .log_event(ActivityEvent {
            timestamp: 500,
            event_type: ActivityEventType::Activate,
            tool: Tool::Codex,
            profile: "work".into(),
            details: serde_json::Map::new(),
        })
        .await
        .unwrap();

    let events = store.list_recent_events(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ActivityEventType::Activate);
}

#[tokio::test]
async fn clear_all_cooldowns_empties_the_table() {
    let (store, _dir) = open_temp().await;
    store.set_cooldown(Tool::Codex, "a".into(), 0, 10, None).await.unwrap();
    store.set_cooldown(Tool::Claude, "b".into(), 0, 10, None).await.unwrap();
    store.clear_all_cooldowns().await.unwrap();
    assert!(store.list_active_cooldowns(5).await.unwrap().is_empty());
}
