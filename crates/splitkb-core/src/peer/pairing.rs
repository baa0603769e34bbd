//! Pairing handshake state machine, seen from a peripheral.
//!
//! ```text
//! Unpaired ──timer──► PairingRequested ──PairingConfirmation──► Paired
//!                        │    ▲
//!                        └────┘ re-broadcast every `retry_interval`
//! ```
//!
//! The machine performs no I/O. [`PairingStateMachine::poll`] tells the
//! caller when a pairing request broadcast is due; the caller sends it.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::address::PeerAddress;

/// Shortest recommended retry interval.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1500);
/// Longest recommended retry interval.
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_millis(3500);
/// Retry interval used when none is configured.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(2500);

/// Current pairing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// No master known and no request sent yet.
    Unpaired,
    /// A request has been broadcast; waiting for a confirmation.
    PairingRequested { last_sent: Instant },
    /// The master answered; its address is known.
    Paired { master: PeerAddress },
}

#[derive(Debug)]
pub struct PairingStateMachine {
    state: PairingState,
    retry_interval: Duration,
    attempts: u32,
}

impl PairingStateMachine {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            state: PairingState::Unpaired,
            retry_interval,
            attempts: 0,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Number of pairing requests issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_paired(&self) -> bool {
        matches!(self.state, PairingState::Paired { .. })
    }

    pub fn master(&self) -> Option<PeerAddress> {
        match self.state {
            PairingState::Paired { master } => Some(master),
            _ => None,
        }
    }

    /// Returns `true` when a pairing request must be broadcast at `now`.
    ///
    /// A `true` result is recorded as a sent request, so the next one is not
    /// due before another `retry_interval` has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = match self.state {
            PairingState::Unpaired => true,
            PairingState::PairingRequested { last_sent } => {
                now.saturating_duration_since(last_sent) >= self.retry_interval
            }
            PairingState::Paired { .. } => false,
        };
        if due {
            self.attempts += 1;
            debug!(attempt = self.attempts, "pairing request due");
            self.state = PairingState::PairingRequested { last_sent: now };
        }
        due
    }

    /// Applies a confirmation received from `master`.
    ///
    /// Returns `true` if this moved the machine into `Paired`. Duplicate
    /// confirmations from the same master are ignored, and so are
    /// confirmations from a different master once paired.
    pub fn on_confirmation(&mut self, master: PeerAddress) -> bool {
        match self.state {
            PairingState::Paired { master: current } if current == master => false,
            PairingState::Paired { master: current } => {
                warn!(%current, other = %master, "ignoring confirmation from second master");
                false
            }
            _ => {
                info!(%master, attempts = self.attempts, "paired with master");
                self.state = PairingState::Paired { master };
                true
            }
        }
    }
}
