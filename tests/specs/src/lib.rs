// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for black-box tests exercising the vault, selector,
//! and identity extractor end to end over a real temp directory,
//! rather than through any single crate's unit tests.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tempfile::TempDir;
use vaultkeeper::tool::Tool;

/// Serializes any test that mutates the process-global `HOME` env var.
/// `cargo test` runs a crate's tests on a thread pool by default, so
/// without this a `HOME` override from one test can leak into another.
fn home_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}

/// Point a tool's auth-file specs at a scratch directory by overriding
/// `HOME` for the duration of the closure.
pub fn with_home<R>(home: &Path, f: impl FnOnce() -> R) -> R {
    let _guard = home_lock();
    let prior = std::env::var_os("HOME");
    std::env::set_var("HOME", home);
    let result = f();
    match prior {
        Some(v) => std::env::set_var("HOME", v),
        None => std::env::remove_var("HOME"),
    }
    result
}

/// Builds a minimal structurally-valid JWT carrying `email` in its
/// payload, with an `exp` claim far in the future.
pub fn jwt_with_email(email: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = serde_json::json!({ "email": email, "exp": 9_999_999_999u64, "sub": email });
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).expect("serialize payload"));
    format!("{header}.{payload_b64}.sig")
}

/// Writes a tool's required live auth files under `home`, with its
/// token field set to a JWT carrying `email`.
pub fn write_auth_files(home: &Path, tool: Tool, email: &str) {
    let jwt = jwt_with_email(email);
    match tool {
        Tool::Codex => {
            let dir = home.join(".codex");
            fs::create_dir_all(&dir).expect("mkdir");
            let body = serde_json::json!({ "id_token": jwt });
            fs::write(dir.join("auth.json"), serde_json::to_vec(&body).unwrap()).expect("write auth.json");
        }
        Tool::Claude => {
            let dir = home.join(".claude");
            fs::create_dir_all(&dir).expect("mkdir");
            let body = serde_json::json!({ "accessToken": jwt });
            fs::write(dir.join(".credentials.json"), serde_json::to_vec(&body).unwrap())
                .expect("write .credentials.json");
        }
        Tool::Gemini => {
            let dir = home.join(".gemini");
            fs::create_dir_all(&dir).expect("mkdir");
            let body = serde_json::json!({ "id_token": jwt });
            fs::write(dir.join("oauth_creds.json"), serde_json::to_vec(&body).unwrap())
                .expect("write oauth_creds.json");
        }
    }
}

/// A scratch `$HOME` plus vault root, torn down together when dropped.
pub struct Scratch {
    pub home: TempDir,
    pub vault_root: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self { home: TempDir::new().expect("home tempdir"), vault_root: TempDir::new().expect("vault tempdir") }
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}
