// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State Store (§4.J): the embedded SQLite-backed relational store of
//! record for cooldowns, wrap sessions, cost rates, identity cache, and
//! the activity log. Mirrors `activity_log` rows to a JSONL sidecar so
//! operators can still `tail -f` human-readable history.

pub mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::model::{ActivityEvent, ActivityEventType, CooldownRecord, CostRate, IdentityCacheRow, WrapSession};
use crate::tool::Tool;
pub use error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    type TEXT NOT NULL,
    tool TEXT NOT NULL,
    profile TEXT NOT NULL,
    duration_seconds INTEGER,
    details TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_log_timestamp ON activity_log(timestamp);

CREATE TABLE IF NOT EXISTS cooldowns (
    tool TEXT NOT NULL,
    profile TEXT NOT NULL,
    hit_at INTEGER NOT NULL,
    cooldown_until INTEGER NOT NULL,
    notes TEXT,
    PRIMARY KEY (tool, profile)
);

CREATE TABLE IF NOT EXISTS wrap_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tool TEXT NOT NULL,
    profile TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    duration_seconds INTEGER,
    exit_code INTEGER,
    rate_limit_hit INTEGER NOT NULL,
    estimated_cost_cents REAL
);
CREATE INDEX IF NOT EXISTS idx_wrap_sessions_tool_started ON wrap_sessions(tool, started_at);

CREATE TABLE IF NOT EXISTS cost_rates (
    tool TEXT PRIMARY KEY,
    cents_per_minute REAL NOT NULL,
    cents_per_session REAL NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS identity_cache (
    tool TEXT NOT NULL,
    profile TEXT NOT NULL,
    email TEXT,
    organization TEXT,
    plan_type TEXT,
    account_id TEXT,
    expires_at INTEGER,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (tool, profile)
);
"#;

/// Handle onto the single-writer/multi-reader SQLite store. Cheap to
/// clone: the connection is shared behind an async mutex so callers
/// don't block the runtime thread on the underlying blocking driver.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    activity_log_path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if absent) the store database at `db_path`,
    /// applying the schema in a single idempotent transaction.
    /// `activity_log_path`, if given, receives a JSONL mirror of every
    /// logged event.
    pub async fn open(db_path: &Path, activity_log_path: Option<PathBuf>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        let path = db_path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Internal(e.to_string()))??;

        Ok(Self { conn: Arc::new(Mutex::new(conn)), activity_log_path })
    }

    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Internal(e.to_string()))?
        .map_err(StoreError::from)
    }

    pub async fn log_event(&self, event: ActivityEvent) -> Result<(), StoreError> {
        if let Some(path) = &self.activity_log_path {
            if let Ok(line) = serde_json::to_string(&event) {
                if let Ok(mut file) =
                    tokio::fs::OpenOptions::new().create(true).append(true).open(path).await
                {
                    let _ = file.write_all(line.as_bytes()).await;
                    let _ = file.write_all(b"\n").await;
                }
            }
        }

        let details = serde_json::to_string(&event.details).unwrap_or_else(|_| "{}".to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO activity_log (timestamp, type, tool, profile, duration_seconds, details) VALUES (?,?,?,?,?,?)",
                params![
                    event.timestamp as i64,
                    event.event_type.as_str(),
                    event.tool.tag(),
                    event.profile,
                    None::<i64>,
                    details,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Persists a new cooldown record, replacing any existing active
    /// record for `(tool, profile)` (§4.D `SetCooldown`).
    pub async fn set_cooldown(
        &self,
        tool: Tool,
        profile: String,
        hit_at: u64,
        duration_secs: u64,
        notes: Option<String>,
    ) -> Result<CooldownRecord, StoreError> {
        let cooldown_until = hit_at + duration_secs;
        let record = CooldownRecord { tool, profile: profile.clone(), hit_at, cooldown_until, notes: notes.clone() };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cooldowns (tool, profile, hit_at, cooldown_until, notes) VALUES (?,?,?,?,?)
                 ON CONFLICT(tool, profile) DO UPDATE SET hit_at=excluded.hit_at, cooldown_until=excluded.cooldown_until, notes=excluded.notes",
                params![tool.tag(), profile, hit_at as i64, cooldown_until as i64, notes],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    pub async fn clear_cooldown(&self, tool: Tool, profile: String) -> Result<Option<CooldownRecord>, StoreError> {
        let existing = self.active_cooldown_row(tool, &profile).await?;
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM cooldowns WHERE tool=? AND profile=?", params![tool.tag(), profile])?;
            Ok(())
        })
        .await?;
        Ok(existing)
    }

    /// The active cooldown for `(tool, profile)` as of `now`, if any
    /// (§4.D `ActiveCooldown`): a row with `cooldown_until > now`.
    pub async fn active_cooldown(&self, tool: Tool, profile: &str, now: u64) -> Result<Option<CooldownRecord>, StoreError> {
        let row = self.active_cooldown_row(tool, profile).await?;
        Ok(row.filter(|r| r.cooldown_until > now))
    }

    async fn active_cooldown_row(&self, tool: Tool, profile: &str) -> Result<Option<CooldownRecord>, StoreError> {
        let profile = profile.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT hit_at, cooldown_until, notes FROM cooldowns WHERE tool=? AND profile=?",
                params![tool.tag(), profile],
                |row| {
                    Ok(CooldownRecord {
                        tool,
                        profile: profile.clone(),
                        hit_at: row.get::<_, i64>(0)? as u64,
                        cooldown_until: row.get::<_, i64>(1)? as u64,
                        notes: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    /// All cooldowns with `cooldown_until > now`, ordered ascending
    /// (§4.D `ListActive`).
    pub async fn list_active_cooldowns(&self, now: u64) -> Result<Vec<CooldownRecord>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT tool, profile, hit_at, cooldown_until, notes FROM cooldowns WHERE cooldown_until > ? ORDER BY cooldown_until ASC",
            )?;
            let rows = stmt
                .query_map(params![now as i64], |row| {
                    let tag: String = row.get(0)?;
                    Ok(CooldownRecord {
                        tool: Tool::parse_tag(&tag).unwrap_or(Tool::Codex),
                        profile: row.get(1)?,
                        hit_at: row.get::<_, i64>(2)? as u64,
                        cooldown_until: row.get::<_, i64>(3)? as u64,
                        notes: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn clear_all_cooldowns(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cooldowns", [])?;
            Ok(())
        })
        .await
    }

    pub async fn record_wrap_session(&self, session: WrapSession) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO wrap_sessions (tool, profile, started_at, duration_seconds, exit_code, rate_limit_hit, estimated_cost_cents) VALUES (?,?,?,?,?,?,?)",
                params![
                    session.tool.tag(),
                    session.profile,
                    session.started_at as i64,
                    session.duration_seconds.map(|d| d as i64),
                    session.exit_code,
                    session.rate_limit_hit as i64,
                    session.estimated_cost_cents,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_wrap_sessions(
        &self,
        tool: Option<Tool>,
        since: Option<u64>,
        limit: u32,
    ) -> Result<Vec<WrapSession>, StoreError> {
        self.with_conn(move |conn| {
            let mut sql = String::from(
                "SELECT tool, profile, started_at, duration_seconds, exit_code, rate_limit_hit, estimated_cost_cents FROM wrap_sessions WHERE 1=1",
            );
            if tool.is_some() {
                sql.push_str(" AND tool = ?1");
            }
            if since.is_some() {
                sql.push_str(if tool.is_some() { " AND started_at >= ?2" } else { " AND started_at >= ?1" });
            }
            sql.push_str(" ORDER BY started_at DESC LIMIT ?");

            let mut stmt = conn.prepare(&sql)?;
            let map_row = |row: &rusqlite::Row| -> rusqlite::Result<WrapSession> {
                let tag: String = row.get(0)?;
                Ok(WrapSession {
                    id: String::new(),
                    tool: Tool::parse_tag(&tag).unwrap_or(Tool::Codex),
                    profile: row.get(1)?,
                    started_at: row.get::<_, i64>(2)? as u64,
                    duration_seconds: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
                    exit_code: row.get(4)?,
                    rate_limit_hit: row.get::<_, i64>(5)? != 0,
                    estimated_cost_cents: row.get(6)?,
                })
            };

            let rows = match (tool, since) {
                (Some(t), Some(s)) => stmt
                    .query_map(params![t.tag(), s as i64, limit], map_row)?
                    .collect::<Result<Vec<_>, _>>()?,
                (Some(t), None) => {
                    stmt.query_map(params![t.tag(), limit], map_row)?.collect::<Result<Vec<_>, _>>()?
                }
                (None, Some(s)) => {
                    stmt.query_map(params![s as i64, limit], map_row)?.collect::<Result<Vec<_>, _>>()?
                }
                (None, None) => stmt.query_map(params![limit], map_row)?.collect::<Result<Vec<_>, _>>()?,
            };
            Ok(rows)
        })
        .await
    }

    /// Total session count, connected minutes, and estimated cost over
    /// the window (§4.J `GetCostSummary`).
    pub async fn get_cost_summary(&self, tool: Option<Tool>, since: Option<u64>) -> Result<CostSummary, StoreError> {
        self.with_conn(move |conn| {
            let mut sql = String::from(
                "SELECT COUNT(*), COALESCE(SUM(duration_seconds),0), COALESCE(SUM(estimated_cost_cents),0) FROM wrap_sessions WHERE 1=1",
            );
            if tool.is_some() {
                sql.push_str(" AND tool = ?1");
            }
            if since.is_some() {
                sql.push_str(if tool.is_some() { " AND started_at >= ?2" } else { " AND started_at >= ?1" });
            }

            let row = |row: &rusqlite::Row| -> rusqlite::Result<CostSummary> {
                Ok(CostSummary {
                    session_count: row.get::<_, i64>(0)? as u64,
                    total_duration_seconds: row.get::<_, i64>(1)? as u64,
                    estimated_cost_cents: row.get(2)?,
                })
            };

            match (tool, since) {
                (Some(t), Some(s)) => conn.query_row(&sql, params![t.tag(), s as i64], row),
                (Some(t), None) => conn.query_row(&sql, params![t.tag()], row),
                (None, Some(s)) => conn.query_row(&sql, params![s as i64], row),
                (None, None) => conn.query_row(&sql, [], row),
            }
        })
        .await
    }

    pub async fn set_cost_rate(&self, rate: CostRate) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cost_rates (tool, cents_per_minute, cents_per_session, updated_at) VALUES (?,?,?,?)
                 ON CONFLICT(tool) DO UPDATE SET cents_per_minute=excluded.cents_per_minute, cents_per_session=excluded.cents_per_session, updated_at=excluded.updated_at",
                params![rate.tool.tag(), rate.cents_per_minute, rate.cents_per_session, rate.updated_at as i64],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_cost_rate(&self, tool: Tool) -> Result<Option<CostRate>, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT cents_per_minute, cents_per_session, updated_at FROM cost_rates WHERE tool=?",
                params![tool.tag()],
                |row| {
                    Ok(CostRate {
                        tool,
                        cents_per_minute: row.get(0)?,
                        cents_per_session: row.get(1)?,
                        updated_at: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()
        })
        .await
    }

    pub async fn list_recent_events(&self, limit: u32) -> Result<Vec<ActivityEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, type, tool, profile, details FROM activity_log ORDER BY timestamp DESC LIMIT ?",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    let event_type: String = row.get(1)?;
                    let tool: String = row.get(2)?;
                    let details_raw: String = row.get(4)?;
                    Ok((event_type, tool, row.get::<_, i64>(0)?, row.get::<_, String>(3)?, details_raw))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let events = rows
                .into_iter()
                .filter_map(|(event_type, tool, timestamp, profile, details_raw)| {
                    Some(ActivityEvent {
                        timestamp: timestamp as u64,
                        event_type: parse_event_type(&event_type)?,
                        tool: Tool::parse_tag(&tool)?,
                        profile,
                        details: serde_json::from_str(&details_raw).unwrap_or_default(),
                    })
                })
                .collect();
            Ok(events)
        })
        .await
    }

    pub async fn cache_identity(&self, row: IdentityCacheRow) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO identity_cache (tool, profile, email, organization, plan_type, account_id, expires_at, fetched_at) VALUES (?,?,?,?,?,?,?,?)
                 ON CONFLICT(tool, profile) DO UPDATE SET email=excluded.email, organization=excluded.organization, plan_type=excluded.plan_type, account_id=excluded.account_id, expires_at=excluded.expires_at, fetched_at=excluded.fetched_at",
                params![
                    row.tool.tag(),
                    row.profile,
                    row.email,
                    row.organization,
                    row.plan_type,
                    row.account_id,
                    row.expires_at.map(|v| v as i64),
                    row.fetched_at as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_cached_identity(&self, tool: Tool, profile: &str) -> Result<Option<IdentityCacheRow>, StoreError> {
        let profile = profile.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT email, organization, plan_type, account_id, expires_at, fetched_at FROM identity_cache WHERE tool=? AND profile=?",
                params![tool.tag(), profile],
                |row| {
                    Ok(IdentityCacheRow {
                        tool,
                        profile: profile.clone(),
                        email: row.get(0)?,
                        organization: row.get(1)?,
                        plan_type: row.get(2)?,
                        account_id: row.get(3)?,
                        expires_at: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
                        fetched_at: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct CostSummary {
    pub session_count: u64,
    pub total_duration_seconds: u64,
    pub estimated_cost_cents: f64,
}

fn parse_event_type(s: &str) -> Option<ActivityEventType> {
    match s {
        "activate" => Some(ActivityEventType::Activate),
        "deactivate" => Some(ActivityEventType::Deactivate),
        "cooldown_set" => Some(ActivityEventType::CooldownSet),
        "cooldown_clear" => Some(ActivityEventType::CooldownClear),
        "refresh" => Some(ActivityEventType::Refresh),
        "handoff_failed" => Some(ActivityEventType::HandoffFailed),
        _ => None,
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
