// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rotation Selector (§4.F): three algorithms over a closed scoring
//! shell. Generalizes the round-robin-with-cooldown-skip loop the
//! teacher used for automatic failover into a `Select` call shared by
//! round-robin, random, and the smart scorer.

use std::fmt;

use indexmap::IndexMap;
use rand::seq::SliceRandom;

use crate::health::{HealthStatus, ProfileHealth};
use crate::model::ProfileUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RoundRobin,
    Random,
    Smart,
}

impl Algorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "round-robin" => Some(Self::RoundRobin),
            "random" => Some(Self::Random),
            "smart" => Some(Self::Smart),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::Random => "random",
            Self::Smart => "smart",
        }
    }
}

#[derive(Debug)]
pub enum SelectorError {
    NoProfiles,
    AllBlocked,
}

impl SelectorError {
    pub fn code(&self) -> &'static str {
        match self {
            SelectorError::NoProfiles => "no_profiles",
            SelectorError::AllBlocked => "all_blocked",
        }
    }
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::NoProfiles => write!(f, "no profiles available to select from"),
            SelectorError::AllBlocked => write!(f, "every candidate is in an active cooldown"),
        }
    }
}

impl std::error::Error for SelectorError {}

/// Per-candidate facts the selector scores against; gathered by the
/// caller from Health, the Cooldown Ledger, and (optionally) the Usage
/// Window Fetcher.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub profile: String,
    pub health_status: HealthStatus,
    pub health: ProfileHealth,
    pub in_cooldown: bool,
    pub usage: Option<ProfileUsage>,
}

#[derive(Debug, Clone)]
pub struct SelectOutcome {
    pub selected: String,
    pub algorithm: Algorithm,
    /// Top-k alternatives (profile, score), excluding the selected one.
    pub alternatives: Vec<(String, f64)>,
}

/// The §4.F scoring table, broken out so tests and operators can
/// override any single weight without touching the algorithm.
#[derive(Debug, Clone, Copy)]
pub struct SmartWeights {
    pub healthy: f64,
    pub warning: f64,
    pub critical: f64,
    pub unknown: f64,
    pub active_cooldown: f64,
    pub error_count_each: f64,
    pub token_valid_long: f64,
    pub token_valid_medium_max: f64,
    pub token_valid_short: f64,
    pub token_expired: f64,
    pub is_current_active: f64,
    pub usage_primary_weight: f64,
    pub usage_secondary_weight: f64,
}

impl Default for SmartWeights {
    fn default() -> Self {
        Self {
            healthy: 100.0,
            warning: 50.0,
            critical: 10.0,
            unknown: 30.0,
            active_cooldown: -200.0,
            error_count_each: -10.0,
            token_valid_long: 20.0,
            token_valid_medium_max: 10.0,
            token_valid_short: -20.0,
            token_expired: -100.0,
            is_current_active: -5.0,
            usage_primary_weight: 1.0,
            usage_secondary_weight: 0.5,
        }
    }
}

const SECONDS_PER_DAY: u64 = 86_400;
const TOP_K_ALTERNATIVES: usize = 2;

pub struct Selector {
    weights: SmartWeights,
}

impl Selector {
    pub fn new(weights: SmartWeights) -> Self {
        Self { weights }
    }

    /// `Select(tool, candidates, currentActive?) -> SelectOutcome` (§4.F).
    ///
    /// `include_cooldown=false` excludes candidates with an active
    /// cooldown from consideration entirely; when every candidate is
    /// excluded that way the call fails with `AllBlocked`.
    pub fn select(
        &self,
        algorithm: Algorithm,
        candidates: &[Candidate],
        current_active: Option<&str>,
        now_secs: u64,
        include_cooldown: bool,
        force_rotation: bool,
    ) -> Result<SelectOutcome, SelectorError> {
        if candidates.is_empty() {
            return Err(SelectorError::NoProfiles);
        }

        let eligible: Vec<&Candidate> =
            candidates.iter().filter(|c| include_cooldown || !c.in_cooldown).collect();
        if eligible.is_empty() {
            return Err(SelectorError::AllBlocked);
        }

        let outcome = match algorithm {
            Algorithm::RoundRobin => self.select_round_robin(&eligible, current_active)?,
            Algorithm::Random => self.select_random(&eligible)?,
            Algorithm::Smart => self.select_smart(&eligible, current_active, now_secs)?,
        };

        if algorithm == Algorithm::Smart && force_rotation && outcome.selected == current_active.unwrap_or_default()
        {
            return self.select_round_robin(&eligible, current_active);
        }

        Ok(outcome)
    }

    fn select_round_robin(
        &self,
        eligible: &[&Candidate],
        current_active: Option<&str>,
    ) -> Result<SelectOutcome, SelectorError> {
        let mut names: Vec<&str> = eligible.iter().map(|c| c.profile.as_str()).collect();
        names.sort_unstable();

        let next = match current_active {
            Some(current) => {
                let pos = names.iter().position(|n| *n == current);
                match pos {
                    Some(idx) => names[(idx + 1) % names.len()],
                    None => names[0],
                }
            }
            None => names[0],
        };

        let alternatives =
            names.iter().filter(|n| **n != next).take(TOP_K_ALTERNATIVES).map(|n| (n.to_string(), 0.0)).collect();

        Ok(SelectOutcome { selected: next.to_string(), algorithm: Algorithm::RoundRobin, alternatives })
    }

    fn select_random(&self, eligible: &[&Candidate]) -> Result<SelectOutcome, SelectorError> {
        let healthy: Vec<&Candidate> =
            eligible.iter().filter(|c| c.health_status != HealthStatus::Critical).copied().collect();
        let pool: Vec<&Candidate> = if healthy.is_empty() { eligible.to_vec() } else { healthy };

        let mut rng = rand::rng();
        let chosen = pool.choose(&mut rng).ok_or(SelectorError::AllBlocked)?;

        let alternatives = pool
            .iter()
            .filter(|c| c.profile != chosen.profile)
            .take(TOP_K_ALTERNATIVES)
            .map(|c| (c.profile.clone(), 0.0))
            .collect();

        Ok(SelectOutcome { selected: chosen.profile.clone(), algorithm: Algorithm::Random, alternatives })
    }

    fn select_smart(
        &self,
        eligible: &[&Candidate],
        current_active: Option<&str>,
        now_secs: u64,
    ) -> Result<SelectOutcome, SelectorError> {
        let mut scored: IndexMap<String, f64> = IndexMap::new();
        for c in eligible {
            scored.insert(c.profile.clone(), self.score(c, current_active, now_secs));
        }
        scored.sort_by(|a_name, a_score, b_name, b_score| {
            b_score.partial_cmp(a_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a_name.cmp(b_name))
        });

        let (selected, _) = scored.iter().next().ok_or(SelectorError::AllBlocked)?;
        let selected = selected.clone();

        let alternatives = scored
            .iter()
            .filter(|(name, _)| **name != selected)
            .take(TOP_K_ALTERNATIVES)
            .map(|(name, score)| (name.clone(), *score))
            .collect();

        Ok(SelectOutcome { selected, algorithm: Algorithm::Smart, alternatives })
    }

    fn score(&self, c: &Candidate, current_active: Option<&str>, now_secs: u64) -> f64 {
        let w = &self.weights;
        let mut score = match c.health_status {
            HealthStatus::Healthy => w.healthy,
            HealthStatus::Warning => w.warning,
            HealthStatus::Critical => w.critical,
            HealthStatus::Unknown => w.unknown,
        };

        if c.in_cooldown {
            score += w.active_cooldown;
        }

        score += w.error_count_each * c.health.error_count_1h as f64;

        score += match c.health.token_expires_at {
            None => 0.0,
            Some(exp) if exp <= now_secs => w.token_expired,
            Some(exp) => {
                let remaining = exp - now_secs;
                if remaining > 7 * SECONDS_PER_DAY {
                    w.token_valid_long
                } else if remaining >= SECONDS_PER_DAY {
                    let fraction = (remaining - SECONDS_PER_DAY) as f64 / (6 * SECONDS_PER_DAY) as f64;
                    w.token_valid_medium_max * fraction.clamp(0.0, 1.0)
                } else {
                    w.token_valid_short
                }
            }
        };

        if current_active.is_some_and(|cur| cur == c.profile) {
            score += w.is_current_active;
        }

        if let Some(usage) = &c.usage {
            if let Some(primary) = usage.primary {
                score -= w.usage_primary_weight * (primary.used_percent - 50.0).max(0.0);
            }
            if let Some(secondary) = usage.secondary {
                score -= w.usage_secondary_weight * (secondary.used_percent - 50.0).max(0.0);
            }
        }

        score
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;
