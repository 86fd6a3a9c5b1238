// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration (§1.1 AMBIENT STACK, §9 "explicit context
//! object"). Argument-parsing UX is out of scope (§1); this struct exists
//! to carry the handful of knobs the core components need, in the
//! teacher's `clap::Parser` + `env` style.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "vaultkeeper", version, about = "Multi-account credential vault and rotation supervisor.")]
pub struct Config {
    /// Root directory holding per-tool profile storage (§6 vault layout).
    #[arg(long, env = "VAULT_ROOT")]
    pub vault_root: Option<PathBuf>,

    /// State store database file.
    #[arg(long, env = "VAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Explicit state-store database path, overriding the default
    /// `<data_dir>/vaultkeeper.sqlite3` (§6.1).
    #[arg(long, env = "VAULT_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Seconds of no PTY output before `RunUntilIdle` considers the
    /// child idle (§6.1).
    #[arg(long, env = "VAULT_IDLE_TIMEOUT", default_value_t = 120)]
    pub idle_timeout_secs: u64,

    /// PTY column count.
    #[arg(long, env = "VAULT_COLS", default_value_t = 120)]
    pub cols: u16,

    /// PTY row count.
    #[arg(long, env = "VAULT_ROWS", default_value_t = 40)]
    pub rows: u16,

    /// Rotation algorithm: round-robin, random, or smart (default).
    #[arg(long, env = "VAULT_ALGORITHM", default_value = "smart")]
    pub algorithm: String,

    /// Maximum handoffs per wrap session (§4.H).
    #[arg(long, env = "VAULT_MAX_RETRIES", default_value_t = 1)]
    pub max_retries: u32,

    /// Cooldown duration in seconds applied on a detected rate limit.
    #[arg(long, env = "VAULT_COOLDOWN_SECS", default_value_t = 3600)]
    pub cooldown_secs: u64,

    /// Per-state timeout in the handoff state machine, in seconds.
    #[arg(long, env = "VAULT_STATE_TIMEOUT_SECS", default_value_t = 30)]
    pub state_timeout_secs: u64,

    /// OAuth exchange timeout in seconds.
    #[arg(long, env = "VAULT_AUTH_TIMEOUT_SECS", default_value_t = 60)]
    pub auth_timeout_secs: u64,

    /// Run a usage-window precheck before activating the selected profile.
    #[arg(long, env = "VAULT_PRECHECK")]
    pub precheck: bool,

    /// Usage threshold (0..1) that triggers the precheck re-selection.
    #[arg(long, env = "VAULT_PRECHECK_THRESHOLD", default_value_t = 0.8)]
    pub precheck_threshold: f64,

    /// Preferred browser profile hint passed through to the login flow.
    #[arg(long, env = "VAULT_BROWSER_PROFILE")]
    pub browser_profile: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "VAULT_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "VAULT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Tool whose session this invocation wraps.
    pub tool: String,

    /// Arguments passed through to the wrapped tool's binary.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.algorithm.as_str(), "round-robin" | "random" | "smart") {
            anyhow::bail!("invalid --algorithm: {}", self.algorithm);
        }
        if !(0.0..=1.0).contains(&self.precheck_threshold) {
            anyhow::bail!("--precheck-threshold must be within 0..1");
        }
        Ok(())
    }

    /// Resolve the vault root directory: `$VAULT_ROOT`, else
    /// `$XDG_DATA_HOME/vaultkeeper/vault`, else `~/.local/share/vaultkeeper/vault`.
    pub fn resolved_vault_root(&self) -> PathBuf {
        self.vault_root.clone().unwrap_or_else(|| data_home().join("vault"))
    }

    /// Resolve the state-store database path.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_home)
    }

    /// Resolve the state-store database file: `--db-path`, else
    /// `<data_dir>/vaultkeeper.sqlite3`.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| self.resolved_data_dir().join("vaultkeeper.sqlite3"))
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cooldown_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cooldown_secs)
    }

    pub fn state_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.state_timeout_secs)
    }

    pub fn auth_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auth_timeout_secs)
    }
}

/// Initialize tracing/logging from config (§1.1 AMBIENT STACK).
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("RUST_LOG").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// `$XDG_DATA_HOME`, defaulting per the XDG basedir spec (§6 env vars).
fn data_home() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("vaultkeeper");
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));
    home.join(".local").join("share").join("vaultkeeper")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
