//! Connection handshake state machine
//!
//! The driver reports raw states on a single multiplexed stream. A connect
//! attempt waits on that stream until the first conclusive state and then
//! stops listening: [`ConnectionState::SyncConnected`] means success, any
//! state in the failure set means the attempt failed, everything else is
//! transitional.

use std::sync::atomic::{AtomicU8, Ordering};

use zoo_driver::ConnectionState;

use crate::error::{Result, ZooError};

/// How a single raw state bears on a pending connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Connected,
    ConnectionFailed,
    Transitional,
}

/// Classify one raw state for a connect attempt
pub fn classify(state: ConnectionState) -> Verdict {
    match state {
        ConnectionState::SyncConnected => Verdict::Connected,
        ConnectionState::AuthFailed
        | ConnectionState::ConnectedReadOnly
        | ConnectionState::Disconnected => Verdict::ConnectionFailed,
        ConnectionState::SaslAuthenticated | ConnectionState::Expired => Verdict::Transitional,
    }
}

/// Lifecycle of one connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    AwaitingConnection = 0,
    Connected = 1,
    Failed = 2,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Phase::Connected,
            2 => Phase::Failed,
            _ => Phase::AwaitingConnection,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Phase::AwaitingConnection)
    }
}

/// Decides a connect attempt from the notifications it observes
///
/// Safe to feed from several threads at once; exactly one observation
/// concludes the attempt.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    phase: AtomicU8,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::AwaitingConnection as u8),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Feed one notification.
    ///
    /// Returns the outcome on the first conclusive state and `None` for
    /// transitional states and for everything observed after that.
    pub fn observe(&self, state: ConnectionState) -> Option<Result<()>> {
        let (target, outcome) = match classify(state) {
            Verdict::Transitional => {
                tracing::trace!("Transitional state {} while connecting", state);
                return None;
            }
            Verdict::Connected => (Phase::Connected, Ok(())),
            Verdict::ConnectionFailed => (Phase::Failed, Err(ZooError::connect_state(state))),
        };

        self.phase
            .compare_exchange(
                Phase::AwaitingConnection as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| {
                tracing::debug!("Connect attempt concluded by {} ({:?})", state, target);
                outcome
            })
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
