// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gathers [`Candidate`] facts for every profile of a tool from the
//! Vault, Identity Extractor, and State Store, for the selector's
//! `SelectProfile`/`SelectAlt` calls.

use crate::health::{self, HealthThresholds, ProfileHealth};
use crate::identity;
use crate::model::ActivityEventType;
use crate::selector::Candidate;
use crate::store::Store;
use crate::tool::Tool;
use crate::vault::Vault;

const ERROR_WINDOW_SECS: u64 = 3600;
const RECENT_EVENTS_SCAN_LIMIT: u32 = 500;

/// Builds one [`Candidate`] per profile currently stored for `tool`,
/// skipping the reserved `_original`/`_auto_backup_*` sentinels.
pub async fn gather(
    vault: &Vault,
    store: &Store,
    tool: Tool,
    now_secs: u64,
    thresholds: &HealthThresholds,
) -> Result<Vec<Candidate>, crate::store::StoreError> {
    let profiles: Vec<String> = vault.list(tool).into_iter().filter(|name| !name.starts_with('_')).collect();
    if profiles.is_empty() {
        return Ok(Vec::new());
    }

    let recent_failures = store.list_recent_events(RECENT_EVENTS_SCAN_LIMIT).await?;

    let mut candidates = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let cooldown = store.active_cooldown(tool, &profile, now_secs).await?;
        let identity_row = store.get_cached_identity(tool, &profile).await?;

        let token_expires_at = identity_row.as_ref().and_then(|r| r.expires_at);
        let error_count_1h = recent_failures
            .iter()
            .filter(|e| {
                e.tool == tool
                    && e.profile == profile
                    && e.event_type == ActivityEventType::HandoffFailed
                    && now_secs.saturating_sub(e.timestamp / 1000) <= ERROR_WINDOW_SECS
            })
            .count() as u32;
        let last_used_at = recent_failures
            .iter()
            .filter(|e| e.tool == tool && e.profile == profile && e.event_type == ActivityEventType::Activate)
            .map(|e| e.timestamp)
            .max();

        let profile_health = ProfileHealth { token_expires_at, error_count_1h, penalty_score: 0.0, last_used_at };
        let status = health::calculate_status(&profile_health, now_secs, thresholds);

        candidates.push(Candidate {
            profile,
            health_status: status,
            health: profile_health,
            in_cooldown: cooldown.is_some(),
            usage: None,
        });
    }

    Ok(candidates)
}

/// Refreshes the identity cache for `profile` from its on-disk auth
/// files, best-effort: a malformed or missing credential file degrades
/// to an absent cache row rather than failing the caller.
pub fn refresh_identity_cache_row(
    vault: &Vault,
    tool: Tool,
    profile: &str,
    now_secs: u64,
) -> Option<crate::model::IdentityCacheRow> {
    let profile_dir = vault.root().join(tool.tag()).join(profile);
    let identity = identity::extract_identity(&profile_dir, tool).ok()?;
    Some(crate::model::IdentityCacheRow {
        tool,
        profile: profile.to_string(),
        email: identity.email,
        organization: identity.organization,
        plan_type: identity.plan_type,
        account_id: identity.account_id,
        expires_at: identity.expires_at,
        fetched_at: now_secs,
    })
}

#[cfg(test)]
#[path = "candidates_tests.rs"]
mod tests;
