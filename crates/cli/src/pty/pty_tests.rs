// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn cmd(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn wait_for_pattern_matches_accumulated_output() {
    let mut pty = PtyController::start(&cmd("printf 'usage limit exceeded\\n'"), 80, 24, None, &[])
        .await
        .expect("start");
    let re = Regex::new(r"(?i)usage limit").unwrap();
    let out = pty.wait_for_pattern(&re, Duration::from_secs(5)).await.expect("pattern match");
    assert!(re.is_match(&out));
}

#[tokio::test]
async fn wait_for_pattern_times_out_without_match() {
    let mut pty = PtyController::start(&cmd("sleep 2"), 80, 24, None, &[]).await.expect("start");
    let re = Regex::new(r"never happens").unwrap();
    let result = pty.wait_for_pattern(&re, Duration::from_millis(300)).await;
    assert!(matches!(result, Err(PtyError::Timeout)));
}

#[tokio::test]
async fn wait_returns_child_exit_code() {
    let pty = PtyController::start(&cmd("exit 3"), 80, 24, None, &[]).await.expect("start");
    let status = pty.wait().await.expect("wait");
    assert_eq!(status.code, Some(3));
}

#[tokio::test]
async fn close_is_idempotent() {
    let mut pty = PtyController::start(&cmd("sleep 5"), 80, 24, None, &[]).await.expect("start");
    pty.close().await.expect("first close");
    pty.close().await.expect("second close");
}

#[tokio::test]
async fn env_overlay_is_visible_to_child() {
    let env = vec![("VAULTKEEPER_TEST_VAR".to_string(), "profile-a".to_string())];
    let mut pty = PtyController::start(&cmd("printf \"$VAULTKEEPER_TEST_VAR\\n\""), 80, 24, None, &env)
        .await
        .expect("start");
    let re = Regex::new("profile-a").unwrap();
    let out = pty.wait_for_pattern(&re, Duration::from_secs(5)).await.expect("pattern match");
    assert!(re.is_match(&out));
}
