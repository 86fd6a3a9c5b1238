// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::health::ProfileHealth;

fn candidate(profile: &str, status: HealthStatus, in_cooldown: bool) -> Candidate {
    Candidate {
        profile: profile.to_string(),
        health_status: status,
        health: ProfileHealth { token_expires_at: None, error_count_1h: 0, penalty_score: 0.0, last_used_at: None },
        in_cooldown,
        usage: None,
    }
}

#[test]
fn empty_candidates_is_no_profiles() {
    let sel = Selector::new(SmartWeights::default());
    let err = sel.select(Algorithm::Smart, &[], None, 0, false, false).unwrap_err();
    assert_eq!(err.code(), "no_profiles");
}

#[test]
fn all_in_cooldown_is_all_blocked() {
    let sel = Selector::new(SmartWeights::default());
    let candidates = vec![candidate("a", HealthStatus::Healthy, true), candidate("b", HealthStatus::Healthy, true)];
    let err = sel.select(Algorithm::Smart, &candidates, None, 0, false, false).unwrap_err();
    assert_eq!(err.code(), "all_blocked");
}

#[test]
fn round_robin_picks_next_after_current_lexicographically() {
    let sel = Selector::new(SmartWeights::default());
    let candidates =
        vec![candidate("alice", HealthStatus::Healthy, false), candidate("bob", HealthStatus::Healthy, false), candidate("carol", HealthStatus::Healthy, false)];
    let outcome = sel.select(Algorithm::RoundRobin, &candidates, Some("alice"), 0, false, false).unwrap();
    assert_eq!(outcome.selected, "bob");

    let wraps = sel.select(Algorithm::RoundRobin, &candidates, Some("carol"), 0, false, false).unwrap();
    assert_eq!(wraps.selected, "alice");
}

#[test]
fn round_robin_skips_cooldown_candidates() {
    let sel = Selector::new(SmartWeights::default());
    let candidates =
        vec![candidate("alice", HealthStatus::Healthy, false), candidate("bob", HealthStatus::Healthy, true), candidate("carol", HealthStatus::Healthy, false)];
    let outcome = sel.select(Algorithm::RoundRobin, &candidates, Some("alice"), 0, false, false).unwrap();
    assert_eq!(outcome.selected, "carol");
}

#[test]
fn smart_prefers_healthy_over_critical() {
    let sel = Selector::new(SmartWeights::default());
    let candidates = vec![candidate("sick", HealthStatus::Critical, false), candidate("fine", HealthStatus::Healthy, false)];
    let outcome = sel.select(Algorithm::Smart, &candidates, None, 0, false, false).unwrap();
    assert_eq!(outcome.selected, "fine");
    assert_eq!(outcome.alternatives.len(), 1);
}

#[test]
fn smart_scores_active_cooldown_far_below_healthy() {
    let sel = Selector::new(SmartWeights::default());
    let candidates =
        vec![candidate("cooling", HealthStatus::Healthy, true), candidate("ready", HealthStatus::Warning, false)];
    let outcome = sel.select(Algorithm::Smart, &candidates, None, 0, true, false).unwrap();
    assert_eq!(outcome.selected, "ready");
}

#[test]
fn force_rotation_reruns_round_robin_on_tie_with_current() {
    let sel = Selector::new(SmartWeights::default());
    let candidates = vec![candidate("alice", HealthStatus::Healthy, false), candidate("bob", HealthStatus::Healthy, false)];
    let outcome = sel.select(Algorithm::Smart, &candidates, Some("alice"), 0, false, true).unwrap();
    assert_ne!(outcome.selected, "alice");
}

#[test]
fn expired_token_is_penalized_heavily() {
    let sel = Selector::new(SmartWeights::default());
    let mut expired = candidate("expired", HealthStatus::Healthy, false);
    expired.health.token_expires_at = Some(100);
    let fresh = candidate("fresh", HealthStatus::Healthy, false);
    let outcome = sel.select(Algorithm::Smart, &[expired, fresh], None, 1000, false, false).unwrap();
    assert_eq!(outcome.selected, "fresh");
}

proptest::proptest! {
    /// §8 invariant 5: `Select` never returns a profile in active
    /// cooldown unless `includeCooldown=true`, for any mix of candidate
    /// health statuses and cooldown flags, under any of the three
    /// algorithms.
    #[test]
    fn never_selects_cooldown_profile_unless_included(
        statuses in proptest::collection::vec(0u8..4, 2..6),
        cooldowns in proptest::collection::vec(proptest::bool::ANY, 2..6),
        algo_idx in 0u8..3,
    ) {
        let n = statuses.len().min(cooldowns.len());
        let candidates: Vec<Candidate> = (0..n)
            .map(|i| {
                let status = match statuses[i] % 4 {
                    0 => HealthStatus::Healthy,
                    1 => HealthStatus::Warning,
                    2 => HealthStatus::Critical,
                    _ => HealthStatus::Unknown,
                };
                candidate(&format!("p{i}"), status, cooldowns[i])
            })
            .collect();
        // Skip cases where every candidate is cooled down; that is
        // `AllBlocked`, a different invariant entirely.
        if candidates.iter().all(|c| c.in_cooldown) {
            return Ok(());
        }

        let algorithm = match algo_idx {
            0 => Algorithm::RoundRobin,
            1 => Algorithm::Random,
            _ => Algorithm::Smart,
        };
        let sel = Selector::new(SmartWeights::default());
        if let Ok(outcome) = sel.select(algorithm, &candidates, None, 0, false, false) {
            let selected_in_cooldown =
                candidates.iter().any(|c| c.profile == outcome.selected && c.in_cooldown);
            proptest::prop_assert!(!selected_in_cooldown);
        }
    }
}
