// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity Extractor (§4.B): recover account identity from a profile's
//! stored auth files by a read-only structural walk — no network I/O, no
//! signature validation.

use std::path::Path;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::Tool;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub email: Option<String>,
    pub organization: Option<String>,
    pub plan_type: Option<String>,
    pub account_id: Option<String>,
    pub expires_at: Option<u64>,
    pub provider: String,
}

impl Identity {
    fn is_fully_empty(&self) -> bool {
        self.email.is_none()
            && self.organization.is_none()
            && self.plan_type.is_none()
            && self.account_id.is_none()
            && self.expires_at.is_none()
    }
}

#[derive(Debug)]
pub enum IdentityError {
    MissingFile,
    MalformedJSON,
    NoTokenFound(Identity),
    MalformedJWT,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::MissingFile => write!(f, "auth file is missing"),
            IdentityError::MalformedJSON => write!(f, "auth file is not valid JSON"),
            IdentityError::NoTokenFound(_) => write!(f, "no candidate token field found"),
            IdentityError::MalformedJWT => write!(f, "token is not a structurally valid JWT"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Candidate JSON paths searched, in order, per tool family, for a JWT or
/// opaque bearer token.
fn candidate_token_paths(tool: Tool) -> &'static [&'static [&'static str]] {
    match tool {
        Tool::Claude => &[&["accessToken"], &["access_token"], &["tokens", "id_token"], &["id_token"]],
        Tool::Codex => &[&["id_token"], &["tokens", "id_token"], &["access_token"]],
        Tool::Gemini => &[&["id_token"], &["access_token"], &["tokens", "access_token"]],
    }
}

/// Field-selection order used when walking a decoded JWT payload (or a
/// provider-specific JSON file) for each semantic identity field.
const EMAIL_FIELDS: &[&str] = &["email", "preferred_username", "upn"];
const ORG_FIELDS: &[&str] = &["organization", "org", "org_name"];
const PLAN_FIELDS: &[&str] = &["plan", "plan_type", "subscription_tier"];
const ACCOUNT_ID_FIELDS: &[&str] = &["account_id", "sub", "user_id"];

/// Extract an [`Identity`] from the given profile directory for `tool`.
/// Purely a function of bytes on disk; never performs network I/O.
pub fn extract_identity(profile_dir: &Path, tool: Tool) -> Result<Identity, IdentityError> {
    let mut last_err = None;
    for spec in tool.auth_file_specs() {
        let path = profile_dir.join(spec.basename());
        if !path.is_file() {
            continue;
        }
        match extract_from_file(&path, tool) {
            Ok(identity) => return Ok(identity),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(IdentityError::MissingFile))
}

/// Returns the raw bearer-token string found at the first matching
/// candidate path in a profile's auth files, for callers (the Usage
/// Window Fetcher's precheck) that need the literal token to send to a
/// tool's usage endpoint rather than a parsed [`Identity`]. The token is
/// returned as-is whether or not it is a structurally valid JWT — an
/// opaque API-key-style token is just as usable as a bearer credential.
pub fn extract_access_token(profile_dir: &Path, tool: Tool) -> Option<String> {
    for spec in tool.auth_file_specs() {
        let path = profile_dir.join(spec.basename());
        if !path.is_file() {
            continue;
        }
        let bytes = std::fs::read(&path).ok()?;
        let root: Value = serde_json::from_slice(&bytes).ok()?;
        for candidate_path in candidate_token_paths(tool) {
            if let Some(Value::String(token)) = walk(&root, candidate_path) {
                return Some(token.clone());
            }
        }
    }
    None
}

fn extract_from_file(path: &Path, tool: Tool) -> Result<Identity, IdentityError> {
    let bytes = std::fs::read(path).map_err(|_| IdentityError::MissingFile)?;
    let root: Value = serde_json::from_slice(&bytes).map_err(|_| IdentityError::MalformedJSON)?;

    for candidate_path in candidate_token_paths(tool) {
        if let Some(Value::String(token)) = walk(&root, candidate_path) {
            match parse_jwt(&token) {
                Ok(payload) => return Ok(identity_from_claims(&payload, "oauth")),
                Err(_) => continue,
            }
        }
    }

    // No JWT anywhere: fall back to a schemaless walk of the whole document,
    // as providers that ship flat JSON metadata files do.
    let identity = identity_from_claims(&root, "api_key");
    if identity.is_fully_empty() {
        return Err(IdentityError::NoTokenFound(identity));
    }
    Ok(identity)
}

fn walk<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for segment in path {
        cur = cur.get(segment)?;
    }
    Some(cur)
}

/// A JWT is structurally valid iff it has exactly three period-separated
/// segments and the middle segment decodes (URL-safe, padded or
/// unpadded) to a JSON object.
fn parse_jwt(token: &str) -> Result<Value, IdentityError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(IdentityError::MalformedJWT);
    }
    let decoded = URL_SAFE_NO_PAD
        .decode(parts[1])
        .or_else(|_| URL_SAFE.decode(parts[1]))
        .map_err(|_| IdentityError::MalformedJWT)?;
    let payload: Value = serde_json::from_slice(&decoded).map_err(|_| IdentityError::MalformedJWT)?;
    if !payload.is_object() {
        return Err(IdentityError::MalformedJWT);
    }
    Ok(payload)
}

fn identity_from_claims(claims: &Value, provider: &str) -> Identity {
    let email = first_string(claims, EMAIL_FIELDS).or_else(|| {
        first_string(claims, &["sub"]).filter(|s| s.contains('@'))
    });
    Identity {
        email,
        organization: first_string(claims, ORG_FIELDS),
        plan_type: first_string(claims, PLAN_FIELDS),
        account_id: first_string(claims, ACCOUNT_ID_FIELDS),
        expires_at: claims.get("exp").and_then(Value::as_u64).map(normalize_epoch),
        provider: provider.to_owned(),
    }
}

fn first_string(root: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| find_nested_str(root, f))
}

/// Walk nested dictionaries, not just top-level keys, since
/// provider-specific JSON files may nest identity fields.
fn find_nested_str(root: &Value, field: &str) -> Option<String> {
    match root {
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get(field) {
                return Some(s.clone());
            }
            map.values().find_map(|v| find_nested_str(v, field))
        }
        _ => None,
    }
}

/// `exp` values above this threshold are millisecond-scale, not seconds.
const MS_SCALE_THRESHOLD: u64 = 1_000_000_000_000;

fn normalize_epoch(value: u64) -> u64 {
    if value > MS_SCALE_THRESHOLD {
        value / 1000
    } else {
        value
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
