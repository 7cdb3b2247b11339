//! Connection state machine

use super::transport::TlsSession;
use crate::{Error, Result};

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, no TLS session (initial state)
    Closed,

    /// TCP socket connected and TLS handshake complete
    Open,
}

impl ConnectionState {
    /// Check if transition is valid
    ///
    /// Re-entering the current state is not a transition; callers treat it as a no-op.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!((self, next), (Closed, Open) | (Open, Closed))
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Resource ownership per state.
///
/// The socket lives inside the session, so one can never be present without the other.
#[derive(Debug, Default)]
pub(crate) enum Lifecycle {
    #[default]
    Closed,
    Open(Box<TlsSession>),
}

impl Lifecycle {
    pub(crate) fn state(&self) -> ConnectionState {
        match self {
            Lifecycle::Closed => ConnectionState::Closed,
            Lifecycle::Open(_) => ConnectionState::Open,
        }
    }

    pub(crate) fn session(&self) -> Option<&TlsSession> {
        match self {
            Lifecycle::Closed => None,
            Lifecycle::Open(session) => Some(session.as_ref()),
        }
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut TlsSession> {
        match self {
            Lifecycle::Closed => Err(Error::NotOpen),
            Lifecycle::Open(session) => Ok(session.as_mut()),
        }
    }

    /// Move to `Closed`, handing back the session if there was one.
    pub(crate) fn take(&mut self) -> Option<Box<TlsSession>> {
        match std::mem::take(self) {
            Lifecycle::Closed => None,
            Lifecycle::Open(session) => Some(session),
        }
    }
}
