// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box scenarios from SPEC_FULL.md §8, driving the vault,
//! selector, state store, and identity extractor together the way the
//! supervisor does rather than through any one crate's unit tests.

use std::fs;

use tempfile::TempDir;
use vaultkeeper::clock::system_clock;
use vaultkeeper::health::HealthThresholds;
use vaultkeeper::model::{ActivityEvent, ActivityEventType};
use vaultkeeper::selector::{Algorithm, Selector, SmartWeights};
use vaultkeeper::store::Store;
use vaultkeeper::supervisor::candidates::gather;
use vaultkeeper::tool::Tool;
use vaultkeeper::vault::Vault;
use vaultkeeper_specs::{with_home, write_auth_files, Scratch};

async fn open_store(dir: &std::path::Path) -> Store {
    Store::open(&dir.join("state.sqlite3"), None).await.expect("open store")
}

/// S1: simple backup/restore round trip, including the overwrite in
/// between that the scenario uses to show restore clobbers whatever
/// is currently on disk.
#[test]
#[serial_test::serial]
fn s1_simple_backup_restore() {
    let scratch = Scratch::new();
    with_home(scratch.home.path(), || {
        let vault = Vault::new(scratch.vault_root.path(), system_clock());
        let codex_dir = scratch.home.path().join(".codex");
        fs::create_dir_all(&codex_dir).expect("mkdir");
        let auth_path = codex_dir.join("auth.json");

        fs::write(&auth_path, br#"{"access_token":"A"}"#).expect("write A");
        vault.backup(Tool::Codex, "work").expect("backup work");

        fs::write(&auth_path, br#"{"access_token":"B"}"#).expect("write B");
        vault.backup(Tool::Codex, "home").expect("backup home");

        vault.restore(Tool::Codex, "work").expect("restore work");

        let restored = fs::read(&auth_path).expect("read restored");
        assert_eq!(restored, br#"{"access_token":"A"}"#);
        assert_eq!(vault.active_profile(Tool::Codex), Some("work".to_owned()));
    });
}

/// S2: the selector refuses to hand back a profile with an active
/// cooldown record, even when it is the only other healthy candidate.
#[tokio::test]
#[serial_test::serial]
async fn s2_selector_rejects_cooldown() {
    let scratch = Scratch::new();
    let data_dir = TempDir::new().expect("data tempdir");
    let store = open_store(data_dir.path()).await;

    with_home(scratch.home.path(), || {
        write_auth_files(scratch.home.path(), Tool::Codex, "a@example.com");
        let vault = Vault::new(scratch.vault_root.path(), system_clock());
        vault.backup(Tool::Codex, "a").expect("backup a");
        fs::write(scratch.home.path().join(".codex").join("auth.json"), br#"{"id_token":"unused"}"#)
            .expect("overwrite for second profile");
        vault.backup(Tool::Codex, "b").expect("backup b");
    });

    store.set_cooldown(Tool::Codex, "a".to_string(), 1_000, 3_600, Some("test".to_string())).await.expect("set cooldown");

    let vault = Vault::new(scratch.vault_root.path(), system_clock());
    let candidates = gather(&vault, &store, Tool::Codex, 1_000, &HealthThresholds::default()).await.expect("gather");
    assert_eq!(candidates.len(), 2);

    let selector = Selector::new(SmartWeights::default());
    let outcome = selector.select(Algorithm::Smart, &candidates, Some(""), 1_000, false, false).expect("select");
    assert_eq!(outcome.selected, "b");
    assert!(!outcome.alternatives.iter().any(|(profile, _)| profile == "a"));
}

/// S3: forced rotation never hands back the currently active profile,
/// even when the smart scorer would otherwise keep picking it.
#[test]
fn s3_forced_rotation_moves_off_current() {
    use vaultkeeper::health::ProfileHealth;
    use vaultkeeper::health::HealthStatus;
    use vaultkeeper::selector::Candidate;

    let x = Candidate {
        profile: "x".to_string(),
        health_status: HealthStatus::Healthy,
        health: ProfileHealth { token_expires_at: None, error_count_1h: 0, penalty_score: 0.0, last_used_at: None },
        in_cooldown: false,
        usage: None,
    };
    let y = Candidate {
        profile: "y".to_string(),
        health_status: HealthStatus::Healthy,
        health: ProfileHealth { token_expires_at: None, error_count_1h: 0, penalty_score: 0.0, last_used_at: None },
        in_cooldown: false,
        usage: None,
    };

    let selector = Selector::new(SmartWeights::default());
    let outcome = selector.select(Algorithm::Smart, &[x, y], Some("x"), 0, false, true).expect("select");
    assert_eq!(outcome.selected, "y");
}

/// S4: auto-activate with no explicit profile argument skips the
/// default profile while it is cooling down and lands on the other
/// healthy candidate.
#[tokio::test]
#[serial_test::serial]
async fn s4_auto_activate_avoids_cooldown_default() {
    let scratch = Scratch::new();
    let data_dir = TempDir::new().expect("data tempdir");
    let store = open_store(data_dir.path()).await;

    with_home(scratch.home.path(), || {
        write_auth_files(scratch.home.path(), Tool::Claude, "a@example.com");
        let vault = Vault::new(scratch.vault_root.path(), system_clock());
        vault.backup(Tool::Claude, "a").expect("backup a");
        fs::write(scratch.home.path().join(".claude").join(".credentials.json"), br#"{"accessToken":"unused"}"#)
            .expect("overwrite for second profile");
        vault.backup(Tool::Claude, "b").expect("backup b");
    });

    store.set_cooldown(Tool::Claude, "a".to_string(), 1_000, 3_600, None).await.expect("set cooldown");

    let vault = Vault::new(scratch.vault_root.path(), system_clock());
    let candidates = gather(&vault, &store, Tool::Claude, 1_000, &HealthThresholds::default()).await.expect("gather");
    let selector = Selector::new(SmartWeights::default());
    // Activating with no explicit profile and a default of "a" is
    // exactly a `currentActive=None` smart selection: there is no
    // session running yet to be "current".
    let outcome = selector.select(Algorithm::Smart, &candidates, None, 1_000, false, false).expect("select");
    assert_eq!(outcome.selected, "b");

    with_home(scratch.home.path(), || {
        vault.restore(Tool::Claude, &outcome.selected).expect("restore chosen profile");
        assert_eq!(vault.active_profile(Tool::Claude), Some("b".to_owned()));
    });
}

/// S6: extracting identity from a JWT-bearing auth file recovers the
/// email and normalizes `exp` to a second-scale Unix timestamp.
#[test]
#[serial_test::serial]
fn s6_jwt_identity_round_trip() {
    let scratch = Scratch::new();
    write_auth_files(scratch.home.path(), Tool::Gemini, "u@x.example");
    let gemini_dir = scratch.home.path().join(".gemini");

    let identity = vaultkeeper::identity::extract_identity(&gemini_dir, Tool::Gemini).expect("extract identity");
    assert_eq!(identity.email.as_deref(), Some("u@x.example"));
    assert_eq!(identity.expires_at, Some(9_999_999_999));
}

/// S7: once the live auth file no longer matches any backed-up
/// profile's content hash, `ActiveProfile` reports none rather than
/// stale state from before the external edit.
#[test]
#[serial_test::serial]
fn s7_active_profile_empty_after_external_modification() {
    let scratch = Scratch::new();
    with_home(scratch.home.path(), || {
        write_auth_files(scratch.home.path(), Tool::Codex, "a@example.com");
        let vault = Vault::new(scratch.vault_root.path(), system_clock());
        vault.backup(Tool::Codex, "work").expect("backup");
        vault.restore(Tool::Codex, "work").expect("restore");
        assert_eq!(vault.active_profile(Tool::Codex), Some("work".to_owned()));

        fs::write(scratch.home.path().join(".codex").join("auth.json"), br#"{"id_token":"someone-elses-token"}"#)
            .expect("external overwrite");
        assert_eq!(vault.active_profile(Tool::Codex), None);
    });
}

/// Boundary: an empty vault reports no active profile, an empty
/// profile list, and `Select` surfaces `NoProfiles` rather than
/// panicking on an empty candidate slice.
#[tokio::test]
#[serial_test::serial]
async fn boundary_empty_vault_has_no_candidates_or_active_profile() {
    let scratch = Scratch::new();
    let data_dir = TempDir::new().expect("data tempdir");
    let store = open_store(data_dir.path()).await;
    let vault = Vault::new(scratch.vault_root.path(), system_clock());

    assert_eq!(vault.list(Tool::Codex), Vec::<String>::new());
    assert_eq!(vault.active_profile(Tool::Codex), None);

    let candidates = gather(&vault, &store, Tool::Codex, 0, &HealthThresholds::default()).await.expect("gather");
    assert!(candidates.is_empty());

    let selector = Selector::new(SmartWeights::default());
    let err = selector.select(Algorithm::Smart, &candidates, None, 0, false, false).unwrap_err();
    assert_eq!(err.code(), "no_profiles");
}

/// The candidate-recency signal the selector's smart weights lean on
/// comes from `Activate` events the store records; a profile with a
/// recent `HandoffFailed` event should show up with a nonzero recent
/// error count once gathered.
#[tokio::test]
#[serial_test::serial]
async fn gathered_candidate_reflects_recent_handoff_failure() {
    let scratch = Scratch::new();
    let data_dir = TempDir::new().expect("data tempdir");
    let store = open_store(data_dir.path()).await;
    with_home(scratch.home.path(), || {
        write_auth_files(scratch.home.path(), Tool::Codex, "a@example.com");
        let vault = Vault::new(scratch.vault_root.path(), system_clock());
        vault.backup(Tool::Codex, "work").expect("backup");
    });

    store
        .log_event(ActivityEvent {
            timestamp: 900,
            event_type: ActivityEventType::HandoffFailed,
            tool: Tool::Codex,
            profile: "work".to_string(),
            details: Default::default(),
        })
        .await
        .expect("log event");

    let vault = Vault::new(scratch.vault_root.path(), system_clock());
    let candidates = gather(&vault, &store, Tool::Codex, 1_000, &HealthThresholds::default()).await.expect("gather");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].health.error_count_1h, 1);
}
