use std::collections::HashSet;
use std::fs;
use std::path::Path;

use base64::Engine;
use tempfile::TempDir;

use super::*;
use crate::clock::system_clock;
use crate::tool::Tool;

/// Point a tool's auth-file specs at a scratch directory by overriding
/// `HOME` for the duration of the closure. Tests are `serial` because
/// `HOME` is process-global.
fn with_home<R>(home: &Path, f: impl FnOnce() -> R) -> R {
    let prior = std::env::var_os("HOME");
    std::env::set_var("HOME", home);
    let result = f();
    match prior {
        Some(v) => std::env::set_var("HOME", v),
        None => std::env::remove_var("HOME"),
    }
    result
}

fn write_codex_auth(home: &Path, email: &str) {
    let dir = home.join(".codex");
    fs::create_dir_all(&dir).expect("mkdir");
    let body = serde_json::json!({ "email": email, "exp": 9_999_999_999u64 });
    let segment = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&body).expect("encode body"));
    let token = format!("header.{segment}.sig");
    fs::write(dir.join("auth.json"), serde_json::to_vec(&serde_json::json!({ "id_token": token })).unwrap())
        .expect("write auth.json");
}

#[test]
#[serial_test::serial]
fn discovers_new_email_and_skips_known_one() {
    let home = TempDir::new().expect("tempdir");
    let vault_root = TempDir::new().expect("tempdir");
    with_home(home.path(), || {
        let vault = Vault::new(vault_root.path(), system_clock());
        write_codex_auth(home.path(), "new-user@example.com");

        let watcher = DiscoveryWatcher::new(Tool::Codex);
        let mut known = HashSet::new();
        watcher.maybe_discover(&vault, &mut known);

        let profiles = vault.list(Tool::Codex);
        assert_eq!(profiles, vec!["discovered_new_user_example_com".to_string()]);
        assert!(known.contains("new-user@example.com"));

        // Second pass with no change should not create a duplicate.
        watcher.maybe_discover(&vault, &mut known);
        assert_eq!(vault.list(Tool::Codex), profiles);
    });
}

#[test]
#[serial_test::serial]
fn known_emails_reflects_existing_profiles() {
    let home = TempDir::new().expect("tempdir");
    let vault_root = TempDir::new().expect("tempdir");
    with_home(home.path(), || {
        let vault = Vault::new(vault_root.path(), system_clock());
        write_codex_auth(home.path(), "work@example.com");
        vault.backup(Tool::Codex, "work").expect("backup");

        let watcher = DiscoveryWatcher::new(Tool::Codex);
        let known = watcher.known_emails(&vault);
        assert!(known.contains("work@example.com"));
    });
}

#[test]
fn slugify_lowercases_and_replaces_punctuation() {
    assert_eq!(slugify("Jane.Doe+work@Example.com"), "discovered_jane_doe_work_example_com");
}
