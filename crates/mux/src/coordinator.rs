// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth Coordinator (§4.I): a per-pane state machine that exchanges
//! OAuth URLs and codes with an external agent. Generalizes the
//! Session Supervisor's single-pane `DriveHandoff` state across N
//! concurrent surfaces.
//!
//! The poll loop is the same `tokio::select! { _ = cancel.cancelled()
//! => break, _ = timer.tick() => {} }` shape as the teacher's
//! `upstream/health.rs::spawn_health_checker`; per-pane timeout/reset
//! reuses the retry-with-backoff discipline of
//! `credential/broker.rs`'s `refresh_loop`, generalized from "single
//! token refresh" to "any stalled pane state."

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::pane::{AuthRequest, AuthRequestStatus, AuthResponse, PaneState, PaneTracker};

pub type SurfaceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// The coordinator's only external collaborator. The Session Supervisor
/// implements this trivially for its single owned PTY; a host that
/// multiplexes many panes is out of scope to build, only the boundary
/// is (§4.I contract).
pub trait SurfaceManager: Send + Sync {
    fn list_panes(&self) -> Vec<String>;
    fn send_text<'a>(&'a self, pane_id: &'a str, text: &'a str) -> SurfaceFuture<'a, ()>;
    fn get_text<'a>(&'a self, pane_id: &'a str) -> SurfaceFuture<'a, String>;
}

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    RateLimited { pane_id: String },
    AuthRequested(AuthRequest),
    AuthCompleted { pane_id: String, account: String },
    AuthFailed { pane_id: String, error: String },
}

struct Inner {
    trackers: Mutex<HashMap<String, PaneTracker>>,
    pending_requests: Mutex<HashMap<String, AuthRequest>>,
}

/// `Start`/`Stop`/`ReceiveAuthResponse`/`GetPendingRequests` per the
/// §4.I contract. Events fire on the bounded channel a caller supplies
/// to [`AuthCoordinator::new`] rather than boxed closures, matching
/// the teacher's `event_tx: mpsc::Sender<_>` convention in
/// `credential/broker.rs`.
pub struct AuthCoordinator<S: SurfaceManager> {
    config: CoordinatorConfig,
    surface: Arc<S>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl<S: SurfaceManager + 'static> AuthCoordinator<S> {
    pub fn new(config: CoordinatorConfig, surface: S, events: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self {
            config,
            surface: Arc::new(surface),
            events,
            inner: Arc::new(Inner { trackers: Mutex::new(HashMap::new()), pending_requests: Mutex::new(HashMap::new()) }),
            handle: Mutex::new(None),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// `Start(ctx)` — begin polling the surface manager at
    /// `pollInterval` (default 500ms).
    pub async fn start(&self, now_ms: impl Fn() -> u64 + Send + Sync + 'static) -> Result<(), CoordinatorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadyRunning);
        }

        let surface = Arc::clone(&self.surface);
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let poll_interval = self.config.poll_interval;
        let state_timeout = self.config.state_timeout;
        let rate_limit_patterns = self.config.rate_limit_patterns.clone();

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {
                        poll_once(&surface, &inner, &events, state_timeout, &rate_limit_patterns, now_ms()).await;
                    }
                }
            }
        });

        *self.handle.lock().await = Some(task);
        Ok(())
    }

    /// `Stop()` — idempotent, waits for the poll loop to drain.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        Ok(())
    }

    /// `ReceiveAuthResponse({requestId, code, account, error?})` —
    /// posts a code or failure to the matching tracker. Fails closed:
    /// a mismatched or unknown `requestId` never mutates tracker state.
    pub async fn receive_auth_response(&self, response: AuthResponse, now_ms: u64) -> Result<(), CoordinatorError> {
        let mut pending = self.inner.pending_requests.lock().await;
        let request = pending
            .get(&response.request_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::NoPendingRequest(response.request_id.clone()))?;

        let mut trackers = self.inner.trackers.lock().await;
        let tracker = trackers
            .get_mut(&request.pane_id)
            .ok_or_else(|| CoordinatorError::UnknownPane(request.pane_id.clone()))?;

        if tracker.request_id.as_deref() != Some(response.request_id.as_str()) {
            return Err(CoordinatorError::RequestIdMismatch {
                expected: tracker.request_id.clone(),
                got: response.request_id.clone(),
            });
        }

        if let Some(error) = response.error {
            tracker.error_message = Some(error.clone());
            tracker.transition(PaneState::Failed, now_ms);
            let _ = self.events.send(CoordinatorEvent::AuthFailed { pane_id: request.pane_id.clone(), error });
        } else {
            tracker.received_code = Some(response.code);
            tracker.used_account = Some(response.account);
            tracker.transition(PaneState::CodeReceived, now_ms);
        }

        pending.remove(&response.request_id);
        Ok(())
    }

    /// `GetPendingRequests()` — snapshot of requests awaiting agent
    /// action.
    pub async fn get_pending_requests(&self) -> Vec<AuthRequest> {
        self.inner.pending_requests.lock().await.values().cloned().collect()
    }

    /// Registers a pane the poll loop should track, or returns the
    /// existing tracker untouched if it is already registered.
    pub async fn track_pane(&self, pane_id: impl Into<String>, now_ms: u64) {
        let pane_id = pane_id.into();
        let mut trackers = self.inner.trackers.lock().await;
        trackers.entry(pane_id.clone()).or_insert_with(|| PaneTracker::new(pane_id, now_ms));
    }

    pub async fn pane_state(&self, pane_id: &str) -> Option<PaneState> {
        self.inner.trackers.lock().await.get(pane_id).map(|t| t.state)
    }

    /// Explicit `Idle → RateLimited` transition for hosts that already
    /// run their own tool-specific rate-limit detector (e.g. the Session
    /// Supervisor's `RateLimitPatterns`) rather than relying on this
    /// crate's generic substring fallback in the poll loop.
    pub async fn mark_rate_limited(&self, pane_id: &str, now_ms: u64) -> Result<(), CoordinatorError> {
        self.transition_checked(pane_id, PaneState::Idle, PaneState::RateLimited, now_ms).await?;
        let _ = self.events.send(CoordinatorEvent::RateLimited { pane_id: pane_id.to_string() });
        Ok(())
    }

    /// `RateLimited → AwaitingMethodSelect`, called once the host has
    /// picked a replacement profile and injected the tool's `/login`
    /// equivalent (§4.H `InjectLoginFlow`).
    pub async fn begin_method_select(&self, pane_id: &str, now_ms: u64) -> Result<(), CoordinatorError> {
        self.transition_checked(pane_id, PaneState::RateLimited, PaneState::AwaitingMethodSelect, now_ms).await
    }

    /// `AwaitingMethodSelect → AwaitingUrl`, called once the host has
    /// injected the numeric choice matching the replacement's auth mode.
    /// From here the poll loop takes over and raises `AuthRequested`
    /// once an OAuth URL appears in the pane's output.
    pub async fn begin_awaiting_url(&self, pane_id: &str, now_ms: u64) -> Result<(), CoordinatorError> {
        self.transition_checked(pane_id, PaneState::AwaitingMethodSelect, PaneState::AwaitingUrl, now_ms).await
    }

    /// `AwaitingConfirm → Idle`, called once the host has observed the
    /// tool's login-success confirmation and injected the resume prompt
    /// (§4.H `ResumePrompt`). Resets the tracker's per-attempt fields so
    /// the pane is ready to detect the next rate-limit event.
    pub async fn complete_handoff(&self, pane_id: &str, now_ms: u64) -> Result<(), CoordinatorError> {
        let mut trackers = self.inner.trackers.lock().await;
        let tracker = trackers.get_mut(pane_id).ok_or_else(|| CoordinatorError::UnknownPane(pane_id.to_string()))?;
        if tracker.state != PaneState::AwaitingConfirm {
            return Err(CoordinatorError::InvalidState {
                pane_id: pane_id.to_string(),
                expected: PaneState::AwaitingConfirm.as_str(),
                found: tracker.state.as_str(),
            });
        }
        tracker.transition(PaneState::Resuming, now_ms);
        tracker.reset_to_idle(now_ms);
        Ok(())
    }

    async fn transition_checked(
        &self,
        pane_id: &str,
        expected: PaneState,
        next: PaneState,
        now_ms: u64,
    ) -> Result<(), CoordinatorError> {
        let mut trackers = self.inner.trackers.lock().await;
        let tracker = trackers.get_mut(pane_id).ok_or_else(|| CoordinatorError::UnknownPane(pane_id.to_string()))?;
        if tracker.state != expected {
            return Err(CoordinatorError::InvalidState {
                pane_id: pane_id.to_string(),
                expected: expected.as_str(),
                found: tracker.state.as_str(),
            });
        }
        tracker.transition(next, now_ms);
        Ok(())
    }
}

async fn poll_once<S: SurfaceManager>(
    surface: &Arc<S>,
    inner: &Arc<Inner>,
    events: &mpsc::UnboundedSender<CoordinatorEvent>,
    state_timeout: std::time::Duration,
    rate_limit_patterns: &[String],
    now_ms: u64,
) {
    let mut trackers = inner.trackers.lock().await;
    let timeout_ms = state_timeout.as_millis() as u64;

    for pane_id in surface.list_panes() {
        trackers.entry(pane_id.clone()).or_insert_with(|| PaneTracker::new(pane_id, now_ms));
    }

    for tracker in trackers.values_mut() {
        if tracker.is_timed_out(now_ms, timeout_ms) {
            warn!(pane_id = %tracker.pane_id, state = tracker.state.as_str(), "pane handoff timed out, resetting");
            if tracker.state != PaneState::Failed {
                tracker.transition(PaneState::Failed, now_ms);
                let _ = events.send(CoordinatorEvent::AuthFailed {
                    pane_id: tracker.pane_id.clone(),
                    error: "state timeout".to_string(),
                });
            } else {
                tracker.reset_to_idle(now_ms);
            }
            continue;
        }

        match surface.get_text(&tracker.pane_id).await {
            Ok(text) => tracker.last_output = text,
            Err(e) => {
                debug!(pane_id = %tracker.pane_id, error = %e, "surface get_text failed");
                continue;
            }
        }

        if tracker.state == PaneState::Idle && matches_any(&tracker.last_output, rate_limit_patterns) {
            tracker.transition(PaneState::RateLimited, now_ms);
            let _ = events.send(CoordinatorEvent::RateLimited { pane_id: tracker.pane_id.clone() });
            continue;
        }

        if tracker.state == PaneState::AwaitingUrl {
            if let Some(url) = extract_oauth_url(&tracker.last_output) {
                tracker.oauth_url = Some(url.clone());
                let request_id = format!("{}-{now_ms}", tracker.pane_id);
                let request = AuthRequest {
                    id: request_id.clone(),
                    pane_id: tracker.pane_id.clone(),
                    url,
                    created_at: now_ms,
                    status: AuthRequestStatus::Pending,
                };
                inner.pending_requests.lock().await.insert(request_id.clone(), request.clone());
                tracker.request_id = Some(request_id);
                tracker.transition(PaneState::AuthPending, now_ms);
                let _ = events.send(CoordinatorEvent::AuthRequested(request));
            }
        }

        if tracker.state == PaneState::CodeReceived {
            if let (Some(code), Some(account)) = (tracker.received_code.clone(), tracker.used_account.clone()) {
                if let Err(e) = surface.send_text(&tracker.pane_id, &code).await {
                    warn!(pane_id = %tracker.pane_id, error = %e, "failed to inject exchange code");
                    continue;
                }
                tracker.transition(PaneState::AwaitingConfirm, now_ms);
                let _ = events.send(CoordinatorEvent::AuthCompleted { pane_id: tracker.pane_id.clone(), account });
            }
        }
    }
}

/// Scrapes the first `https://` URL out of a pane's scrollback delta.
/// OAuth URL shapes are provider-specific and out of scope beyond
/// recognizing the scheme (§1).
fn extract_oauth_url(text: &str) -> Option<String> {
    text.split_whitespace().find(|tok| tok.starts_with("https://")).map(|tok| tok.trim_end_matches(['.', ',']).to_string())
}

fn matches_any(text: &str, patterns: &[String]) -> bool {
    let lower = text.to_lowercase();
    patterns.iter().any(|p| lower.contains(p.as_str()))
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
