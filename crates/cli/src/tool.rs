// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of tools whose credentials this system manages.
//!
//! Per-tool quirks (file layout, default binary, login command shape,
//! rate-limit phrasing) are expressed as small lookup tables keyed off
//! [`Tool`], following the same closed-sum-plus-factory-table shape the
//! teacher uses for its own per-agent dispatch.

use std::path::PathBuf;

use regex::bytes::RegexSet;
use serde::{Deserialize, Serialize};

/// A known external interactive CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Codex,
    Claude,
    Gemini,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Codex, Tool::Claude, Tool::Gemini];

    /// Short lowercase tag used as a directory/env-var component.
    pub fn tag(self) -> &'static str {
        match self {
            Tool::Codex => "codex",
            Tool::Claude => "claude",
            Tool::Gemini => "gemini",
        }
    }

    pub fn parse_tag(s: &str) -> Option<Tool> {
        match s {
            "codex" => Some(Tool::Codex),
            "claude" => Some(Tool::Claude),
            "gemini" => Some(Tool::Gemini),
            _ => None,
        }
    }

    /// Default binary invoked under the PTY when the user doesn't override it.
    pub fn default_binary(self) -> &'static str {
        match self {
            Tool::Codex => "codex",
            Tool::Claude => "claude",
            Tool::Gemini => "gemini",
        }
    }

    /// The `*_HOME` environment variable override recognized for this tool.
    pub fn home_env_var(self) -> &'static str {
        match self {
            Tool::Codex => "CODEX_HOME",
            Tool::Claude => "CLAUDE_HOME",
            Tool::Gemini => "GEMINI_HOME",
        }
    }

    /// Command line injected into the PTY to start a re-login flow.
    pub fn login_command(self) -> &'static str {
        "/login"
    }

    /// The tool's declared `AuthFileSet`, resolved against the current
    /// environment: the tool's `*_HOME` override if set, else the home
    /// directory's conventional dotfile location (§6).
    pub fn auth_file_specs(self) -> Vec<AuthFileSpec> {
        let home = dirs_home();
        let tool_home = std::env::var_os(self.home_env_var()).map(PathBuf::from);
        match self {
            Tool::Codex => {
                let base = tool_home.unwrap_or_else(|| home.join(".codex"));
                vec![AuthFileSpec {
                    path: base.join("auth.json"),
                    required: true,
                    description: "OAuth/API-key credentials".into(),
                }]
            }
            Tool::Claude => {
                let base = tool_home.unwrap_or_else(|| home.join(".claude"));
                vec![
                    AuthFileSpec {
                        path: base.join(".credentials.json"),
                        required: true,
                        description: "OAuth access/refresh tokens".into(),
                    },
                    AuthFileSpec {
                        path: home.join(".claude.json"),
                        required: false,
                        description: "account metadata (email, org)".into(),
                    },
                ]
            }
            Tool::Gemini => {
                let base = tool_home.unwrap_or_else(|| home.join(".gemini"));
                vec![AuthFileSpec {
                    path: base.join("oauth_creds.json"),
                    required: true,
                    description: "OAuth credentials".into(),
                }]
            }
        }
    }

    /// Menu entries offered by this tool's account-type picker after
    /// `/login` is injected (§4.H `InjectLoginFlow`, §9 Open Question 2).
    /// The mapping from a profile's auth mode to a numeric choice is
    /// tool-specific and may drift between tool versions; callers that
    /// find no confident match must fail rather than guess a digit.
    pub fn method_menu_entries(self) -> &'static [MethodMenuEntry] {
        match self {
            Tool::Codex => &[
                MethodMenuEntry { auth_mode: "oauth", choice: "1", label_pattern: r"(?i)sign in with chatgpt" },
                MethodMenuEntry { auth_mode: "api_key", choice: "2", label_pattern: r"(?i)api key" },
            ],
            Tool::Claude => &[
                MethodMenuEntry { auth_mode: "oauth", choice: "1", label_pattern: r"(?i)claude\.ai account" },
                MethodMenuEntry { auth_mode: "api_key", choice: "2", label_pattern: r"(?i)api key" },
            ],
            Tool::Gemini => &[
                MethodMenuEntry { auth_mode: "oauth", choice: "1", label_pattern: r"(?i)sign in with google" },
                MethodMenuEntry { auth_mode: "api_key", choice: "2", label_pattern: r"(?i)gemini api key" },
            ],
        }
    }

    /// Pattern matched against the PTY's accumulated output to
    /// recognize that the account-type menu is currently showing (as
    /// opposed to matching a single entry's label, which only
    /// disambiguates the numeric choice once the menu is known to be
    /// up).
    pub fn method_menu_pattern(self) -> &'static str {
        match self {
            Tool::Codex => r"(?i)sign in with chatgpt",
            Tool::Claude => r"(?i)select login method",
            Tool::Gemini => r"(?i)how would you like to authenticate",
        }
    }

    /// Safe default rate-limit phrase set for this tool, overridable via
    /// `VAULT_RATE_LIMIT_PATTERNS_<TOOL>` (see [`crate::config`]).
    pub fn default_rate_limit_patterns(self) -> Vec<&'static str> {
        vec![
            r"(?i)usage limit",
            r"(?i)rate limit",
            r"(?i)quota exceeded",
            r"(?i)resets?\s+at\s+\d{4}-\d{2}-\d{2}",
            r"(?i)too many requests",
        ]
    }
}

/// One entry of a tool's account-type picker: which numeric choice
/// selects a given auth mode, and the label text that identifies it.
#[derive(Debug, Clone, Copy)]
pub struct MethodMenuEntry {
    pub auth_mode: &'static str,
    pub choice: &'static str,
    pub label_pattern: &'static str,
}

/// A single file member of a tool's `AuthFileSet`.
#[derive(Debug, Clone)]
pub struct AuthFileSpec {
    pub path: PathBuf,
    pub required: bool,
    pub description: String,
}

impl AuthFileSpec {
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".into())
    }
}

/// Compiled rate-limit detector for one tool, built once from either the
/// tool's default patterns or an operator override.
pub struct RateLimitPatterns {
    set: Option<RegexSet>,
}

impl RateLimitPatterns {
    pub fn for_tool(tool: Tool) -> Self {
        Self::from_patterns(&env_override(tool).unwrap_or_else(|| {
            tool.default_rate_limit_patterns().into_iter().map(String::from).collect()
        }))
    }

    pub fn from_patterns(patterns: &[String]) -> Self {
        // A malformed operator-supplied pattern must not crash the
        // supervisor; fall back to "never matches" and let callers rely
        // on the logged warning, matching the propagation policy of
        // non-fatal infrastructure errors in §7.
        let set = match RegexSet::new(patterns) {
            Ok(set) => Some(set),
            Err(e) => {
                tracing::warn!(error = %e, "invalid rate-limit pattern set, disabling rate-limit detection");
                None
            }
        };
        Self { set }
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.set.as_ref().is_some_and(|s| s.is_match(haystack))
    }
}

fn env_override(tool: Tool) -> Option<Vec<String>> {
    let var = format!("VAULT_RATE_LIMIT_PATTERNS_{}", tool.tag().to_uppercase());
    std::env::var(var).ok().map(|raw| raw.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect())
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
