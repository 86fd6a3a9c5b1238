// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY Controller (§4.G): spawn a child under a pseudo-terminal, stream
//! its output, inject keystrokes, and block until a regex pattern
//! appears in the accumulated output. Platform-conditional: on
//! non-unix targets every operation returns `NotSupported`.

pub mod nbio;
#[cfg(unix)]
pub mod spawn;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use regex::bytes::Regex;
use tokio_util::sync::CancellationToken;

use crate::event::PtySignal;

/// Default poll window for non-blocking reads (§4.G `ReadOutput`).
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on the pattern-accumulation buffer; oldest bytes are
/// dropped past this so a runaway child can't grow it unbounded.
const MAX_ACCUMULATOR: usize = 1 << 20;
/// Grace period between `Close`'s TERM and KILL.
const CLOSE_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

#[derive(Debug)]
pub enum PtyError {
    NotSupported,
    Timeout,
    Cancelled,
    Io(String),
}

impl PtyError {
    pub fn code(&self) -> &'static str {
        match self {
            PtyError::NotSupported => "not_supported",
            PtyError::Timeout => "pattern_timeout",
            PtyError::Cancelled => "cancelled",
            PtyError::Io(_) => "io_error",
        }
    }
}

impl fmt::Display for PtyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtyError::NotSupported => write!(f, "pseudo-terminals are not supported on this platform"),
            PtyError::Timeout => write!(f, "timed out waiting for pattern"),
            PtyError::Cancelled => write!(f, "operation cancelled"),
            PtyError::Io(msg) => write!(f, "pty io error: {msg}"),
        }
    }
}

impl std::error::Error for PtyError {}

impl From<anyhow::Error> for PtyError {
    fn from(e: anyhow::Error) -> Self {
        PtyError::Io(e.to_string())
    }
}

impl From<std::io::Error> for PtyError {
    fn from(e: std::io::Error) -> Self {
        PtyError::Io(e.to_string())
    }
}

#[cfg(unix)]
pub struct PtyController {
    inner: spawn::NativePty,
    pending: Vec<u8>,
    closed: bool,
    saw_eof: bool,
}

#[cfg(unix)]
impl PtyController {
    pub async fn start(
        command: &[String],
        cols: u16,
        rows: u16,
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> Result<Self, PtyError> {
        let inner = spawn::NativePty::spawn(command, cols, rows, cwd, env)?;
        Ok(Self { inner, pending: Vec::new(), closed: false, saw_eof: false })
    }

    /// True once a read has observed the master fd closed (the child's
    /// pty slave went away, almost always meaning the child exited).
    /// Callers combine this with [`PtyController::wait`] to reap the
    /// exit status without polling `wait()` concurrently with reads.
    pub fn eof(&self) -> bool {
        self.saw_eof
    }

    pub async fn inject_command(&self, line: &str) -> Result<(), PtyError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.inject_raw(&data).await
    }

    pub async fn inject_raw(&self, bytes: &[u8]) -> Result<(), PtyError> {
        nbio::write_all(self.inner.master(), bytes).await.map_err(PtyError::from)
    }

    /// Whatever bytes are currently available, polling for up to ~100ms.
    /// Empty is not an error.
    pub async fn read_output(&mut self) -> Result<Vec<u8>, PtyError> {
        if let Some(chunk) = self.poll_once().await? {
            self.append_pending(&chunk);
        }
        Ok(std::mem::take(&mut self.pending))
    }

    pub async fn read_line(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>, PtyError> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                return Ok(self.pending.drain(..=pos).collect());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(PtyError::Cancelled),
                chunk = self.poll_once() => {
                    if let Some(c) = chunk? {
                        self.append_pending(&c);
                    }
                }
            }
        }
    }

    pub async fn wait_for_pattern(&mut self, pattern: &Regex, timeout: Duration) -> Result<Vec<u8>, PtyError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pattern.is_match(&self.pending) {
                return Ok(self.pending.clone());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PtyError::Timeout);
            }
            if let Some(chunk) = self.poll_once().await? {
                self.append_pending(&chunk);
            }
        }
    }

    pub async fn wait(&self) -> Result<ExitStatus, PtyError> {
        self.inner.wait().await.map_err(PtyError::from)
    }

    pub fn signal(&self, sig: PtySignal) -> Result<(), PtyError> {
        self.inner.signal(sig.to_nix()).map_err(PtyError::from)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.inner.resize(cols, rows).map_err(PtyError::from)
    }

    /// Close the PTY master, sending TERM then KILL after a grace
    /// period. Idempotent.
    pub async fn close(&mut self) -> Result<(), PtyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.inner.signal(PtySignal::Term.to_nix());
        tokio::time::sleep(CLOSE_GRACE).await;
        let _ = self.inner.signal(PtySignal::Kill.to_nix());
        Ok(())
    }

    pub fn fd(&self) -> i32 {
        self.inner.fd()
    }

    async fn poll_once(&mut self) -> Result<Option<Vec<u8>>, PtyError> {
        let mut buf = [0u8; 4096];
        match tokio::time::timeout(POLL_INTERVAL, nbio::read_chunk(self.inner.master(), &mut buf)).await {
            Ok(Ok(0)) => {
                self.saw_eof = true;
                Ok(None)
            }
            Ok(Ok(n)) => Ok(Some(buf[..n].to_vec())),
            Ok(Err(e)) if e.raw_os_error() == Some(nix::libc::EIO) => {
                self.saw_eof = true;
                Ok(None)
            }
            Ok(Err(e)) => Err(PtyError::from(e)),
            Err(_elapsed) => Ok(Some(Vec::new())),
        }
    }

    fn append_pending(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > MAX_ACCUMULATOR {
            let overflow = self.pending.len() - MAX_ACCUMULATOR;
            self.pending.drain(..overflow);
        }
    }
}

#[cfg(not(unix))]
pub struct PtyController;

#[cfg(not(unix))]
impl PtyController {
    pub async fn start(
        _command: &[String],
        _cols: u16,
        _rows: u16,
        _cwd: Option<&Path>,
        _env: &[(String, String)],
    ) -> Result<Self, PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn inject_command(&self, _line: &str) -> Result<(), PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn inject_raw(&self, _bytes: &[u8]) -> Result<(), PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn read_output(&mut self) -> Result<Vec<u8>, PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn read_line(&mut self, _cancel: &CancellationToken) -> Result<Vec<u8>, PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn wait_for_pattern(&mut self, _pattern: &Regex, _timeout: Duration) -> Result<Vec<u8>, PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn wait(&self) -> Result<ExitStatus, PtyError> {
        Err(PtyError::NotSupported)
    }

    pub fn signal(&self, _sig: PtySignal) -> Result<(), PtyError> {
        Err(PtyError::NotSupported)
    }

    pub fn resize(&self, _cols: u16, _rows: u16) -> Result<(), PtyError> {
        Err(PtyError::NotSupported)
    }

    pub async fn close(&mut self) -> Result<(), PtyError> {
        Ok(())
    }

    pub fn fd(&self) -> i32 {
        -1
    }

    pub fn eof(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
