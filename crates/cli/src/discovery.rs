// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery: auto-saves a new profile when a tool's live auth files
//! change and identity extraction yields an email the vault has never
//! seen under that tool (§3 profile lifecycle). Debounces filesystem
//! events over a 500ms coalescing window before acting (§5). Modeled
//! on the teacher's `driver::log_watch::LogWatcher` notify-plus-poll
//! shape.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::identity;
use crate::tool::Tool;
use crate::vault::Vault;

const DEBOUNCE: Duration = Duration::from_millis(500);
const POLL_FALLBACK: Duration = Duration::from_secs(5);

/// Watches a tool's live `AuthFileSet` paths and auto-backs-up a new
/// profile when their content resolves to an email not already known
/// to the vault under this tool.
pub struct DiscoveryWatcher {
    tool: Tool,
}

impl DiscoveryWatcher {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    /// Runs until `shutdown` is cancelled. A failed watch setup falls
    /// back to a plain poll of the auth files so discovery still
    /// eventually happens, matching `LogWatcher`'s fallback.
    pub async fn run(self, vault: &Vault, shutdown: CancellationToken) {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = self.setup_notify_watcher(wake_tx);
        let mut poll_interval = tokio::time::interval(POLL_FALLBACK);

        let mut known_emails = self.known_emails(vault);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {
                    tokio::time::sleep(DEBOUNCE).await;
                    while wake_rx.try_recv().is_ok() {}
                }
                _ = poll_interval.tick() => {}
            }

            self.maybe_discover(vault, &mut known_emails);
        }
    }

    fn known_emails(&self, vault: &Vault) -> HashSet<String> {
        vault
            .list(self.tool)
            .into_iter()
            .filter_map(|name| {
                let dir = vault.profile_path(self.tool, &name);
                identity::extract_identity(&dir, self.tool).ok().and_then(|i| i.email)
            })
            .collect()
    }

    fn maybe_discover(&self, vault: &Vault, known_emails: &mut HashSet<String>) {
        if !vault.has_auth_files(self.tool) {
            return;
        }
        let Some(staging) = stage_live_files(self.tool) else { return };
        let Ok(identity) = identity::extract_identity(staging.path(), self.tool) else { return };
        let Some(email) = identity.email else { return };
        if known_emails.contains(&email) {
            return;
        }

        let name = slugify(&email);
        match vault.backup(self.tool, &name) {
            Ok(()) => {
                info!(tool = self.tool.tag(), profile = %name, "auto-discovered new profile");
                known_emails.insert(email);
            }
            Err(e) => warn!(error = %e, tool = self.tool.tag(), "discovery auto-backup failed"),
        }
    }

    fn setup_notify_watcher(&self, wake_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.try_send(());
        })
        .ok()?;

        let mut watched_dirs: HashSet<PathBuf> = HashSet::new();
        for spec in self.tool.auth_file_specs() {
            if let Some(parent) = spec.path.parent() {
                watched_dirs.insert(parent.to_path_buf());
            }
        }
        for dir in &watched_dirs {
            let _ = watcher.watch(dir, RecursiveMode::NonRecursive);
        }
        Some(watcher)
    }
}

/// Copies the tool's live `AuthFileSet` into a scratch directory,
/// flattened by basename the same way `Vault::backup` lays out a
/// profile, so `identity::extract_identity` (which expects that flat
/// shape) can run against the live files without mutating vault state.
fn stage_live_files(tool: Tool) -> Option<tempfile::TempDir> {
    let dir = tempfile::tempdir().ok()?;
    let mut any = false;
    for spec in tool.auth_file_specs() {
        if let Ok(bytes) = std::fs::read(&spec.path) {
            let dest = dir.path().join(spec.basename());
            if std::fs::write(dest, bytes).is_ok() {
                any = true;
            }
        }
    }
    any.then_some(dir)
}

fn slugify(email: &str) -> String {
    let slug: String =
        email.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' }).collect();
    format!("discovered_{slug}")
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
