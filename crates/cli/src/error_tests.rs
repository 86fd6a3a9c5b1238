// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn no_profiles_exits_2() {
    assert_eq!(ErrorCode::NoProfiles.exit_code(), 2);
    assert_eq!(ErrorCode::AllBlocked.exit_code(), 2);
}

#[test]
fn io_error_exits_1() {
    assert_eq!(ErrorCode::IOError.exit_code(), 1);
}

#[test]
fn cancelled_exits_130() {
    assert_eq!(ErrorCode::Cancelled.exit_code(), 130);
}

#[test]
fn envelope_round_trips_through_json() {
    let env = FailureEnvelope::new("run", ErrorCode::NoProfiles, "no candidates available")
        .with_suggestions(vec!["add a profile with `backup`".into()]);
    let json = serde_json::to_string(&env).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("no_profiles"));
    let back: FailureEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(back.error.code, "no_profiles");
    assert_eq!(back.suggestions.len(), 1);
}
