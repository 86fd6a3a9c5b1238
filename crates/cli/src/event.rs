// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named signals deliverable to a child process under the PTY Controller
//! (§4.G `Signal(sig ∈ {INT, TERM, KILL, HUP})`).

use nix::sys::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtySignal {
    Int,
    Term,
    Kill,
    Hup,
}

impl PtySignal {
    /// Parse a signal name (e.g. "SIGINT", "INT") into a `PtySignal`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        match bare {
            "INT" => Some(Self::Int),
            "TERM" => Some(Self::Term),
            "KILL" => Some(Self::Kill),
            "HUP" => Some(Self::Hup),
            _ => None,
        }
    }

    pub fn to_nix(self) -> Signal {
        match self {
            Self::Int => Signal::SIGINT,
            Self::Term => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
            Self::Hup => Signal::SIGHUP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_sig_prefix() {
        assert_eq!(PtySignal::from_name("SIGINT"), Some(PtySignal::Int));
        assert_eq!(PtySignal::from_name("int"), Some(PtySignal::Int));
        assert_eq!(PtySignal::from_name("bogus"), None);
    }
}
