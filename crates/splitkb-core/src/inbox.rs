//! Bounded controller inbox.
//!
//! Every controller owns the receiving end of one bounded `mpsc` channel.
//! Producers (the transport receive pump, the matrix source) hold an
//! [`InboxSender`] and enqueue with a short timeout. A message that cannot be
//! enqueued in time is dropped with a warning so a stalled controller never
//! backs up into the radio or the scanner.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, warn};

use crate::transport::Frame;

pub const MIN_CAPACITY: usize = 16;
pub const MAX_CAPACITY: usize = 32;
pub const DEFAULT_CAPACITY: usize = 32;
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(5);

/// Inbox sizing, as read from config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxSettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_enqueue_timeout_ms() -> u64 {
    DEFAULT_ENQUEUE_TIMEOUT.as_millis() as u64
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
        }
    }
}

impl InboxSettings {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn is_valid_capacity(&self) -> bool {
        (MIN_CAPACITY..=MAX_CAPACITY).contains(&self.capacity)
    }
}

/// Producer side of a controller inbox.
#[derive(Debug)]
pub struct InboxSender<T> {
    tx: mpsc::Sender<T>,
    enqueue_timeout: Duration,
}

impl<T> Clone for InboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            enqueue_timeout: self.enqueue_timeout,
        }
    }
}

/// Creates an inbox. Capacities outside 16–32 are clamped into range.
pub fn inbox<T>(settings: InboxSettings) -> (InboxSender<T>, mpsc::Receiver<T>) {
    let capacity = settings.capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
    if capacity != settings.capacity {
        warn!(requested = settings.capacity, capacity, "inbox capacity clamped");
    }
    let (tx, rx) = mpsc::channel(capacity);
    let sender = InboxSender {
        tx,
        enqueue_timeout: settings.enqueue_timeout(),
    };
    (sender, rx)
}

impl<T> InboxSender<T> {
    /// Enqueues `message`, waiting at most the enqueue timeout.
    ///
    /// Returns `false` if the message was dropped.
    pub async fn post(&self, message: T) -> bool {
        match self.tx.send_timeout(message, self.enqueue_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(timeout = ?self.enqueue_timeout, "controller inbox full, message dropped");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!("controller inbox closed, message dropped");
                false
            }
        }
    }

    /// Enqueues `message`, waiting for space as long as it takes.
    ///
    /// Used for control messages such as shutdown that must not be lost.
    pub async fn post_blocking(&self, message: T) -> bool {
        self.tx.send(message).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Pumps frames from a transport into a controller inbox until either side
/// goes away.
pub async fn forward_frames<T>(
    mut frames: mpsc::Receiver<Frame>,
    inbox: InboxSender<T>,
    wrap: fn(Frame) -> T,
) {
    while let Some(frame) = frames.recv().await {
        if !inbox.post(wrap(frame)).await && inbox.is_closed() {
            break;
        }
    }
    debug!("frame pump stopped");
}
