//! Wrapping sequence counter for default pairing-request payloads.
//!
//! When a peripheral broadcasts a pairing request without an explicit
//! payload, the payload is a single byte taken from this counter. The master
//! echoes it back in the confirmation, so a log of both sides lines up.

use std::sync::atomic::{AtomicU8, Ordering};

/// A thread-safe counter that yields `0, 1, …, 255, 0, …`.
///
/// # Examples
///
/// ```rust
/// use splitkb_core::protocol::PairingSequence;
///
/// let seq = PairingSequence::new();
/// assert_eq!(seq.next(), 0);
/// assert_eq!(seq.next(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PairingSequence {
    inner: AtomicU8,
}

impl PairingSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence byte. Wraps from 255 to 0.
    pub fn next(&self) -> u8 {
        // fetch_add wraps on overflow.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) will yield.
    pub fn current(&self) -> u8 {
        self.inner.load(Ordering::Relaxed)
    }
}
