use super::*;

fn thresholds() -> HealthThresholds {
    HealthThresholds { error_count_warning: 3, error_count_critical: 8, warning_expiry_secs: SECONDS_PER_DAY }
}

#[test]
fn expired_token_is_critical() {
    let h = ProfileHealth { token_expires_at: Some(100), error_count_1h: 0, penalty_score: 0.0, last_used_at: Some(50) };
    assert_eq!(calculate_status(&h, 200, &thresholds()), HealthStatus::Critical);
}

#[test]
fn expiry_within_24h_is_warning() {
    let h = ProfileHealth {
        token_expires_at: Some(1_000 + SECONDS_PER_DAY / 2),
        error_count_1h: 0,
        penalty_score: 0.0,
        last_used_at: Some(1_000),
    };
    assert_eq!(calculate_status(&h, 1_000, &thresholds()), HealthStatus::Warning);
}

#[test]
fn no_expiry_and_no_activity_is_unknown() {
    let h = ProfileHealth { token_expires_at: None, error_count_1h: 0, penalty_score: 0.0, last_used_at: None };
    assert_eq!(calculate_status(&h, 1_000, &thresholds()), HealthStatus::Unknown);
}

#[test]
fn otherwise_healthy() {
    let h = ProfileHealth {
        token_expires_at: Some(1_000 + 10 * SECONDS_PER_DAY),
        error_count_1h: 0,
        penalty_score: 0.0,
        last_used_at: Some(500),
    };
    assert_eq!(calculate_status(&h, 1_000, &thresholds()), HealthStatus::Healthy);
}

#[test]
fn penalty_decays_towards_zero_over_time() {
    let decayed = decay_penalty(100.0, 3600.0, 3600.0, 0.5);
    assert!((decayed - 50.0).abs() < 1e-9);
}
