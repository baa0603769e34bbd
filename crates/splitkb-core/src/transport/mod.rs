//! Link transport abstraction.
//!
//! A [`Transport`] moves tagged byte buffers between keyboard halves. It
//! promises nothing about delivery, ordering, or duplication; everything above
//! it is written to tolerate loss.
//!
//! Inbound frames do not arrive through callbacks. Each transport hands out an
//! `mpsc::Receiver<Frame>` when it is created, and the owning controller pumps
//! that receiver into its own inbox. Only tags enabled with
//! [`Transport::listen`] are delivered.
//!
//! # Implementations
//!
//! - **`memory`** – an in-process medium shared by any number of endpoints.
//!   Used by tests and by the end-to-end demos.
//! - **`udp`** – emulates the broadcast radio medium over UDP datagrams so the
//!   master and peripheral binaries can talk across processes.

pub mod memory;
pub mod udp;

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::peer::PeerAddress;
use crate::protocol::messages::{PacketType, Payload, MAX_FRAME_PAYLOAD};

pub use memory::{MemoryBus, MemoryTransport};
pub use udp::{UdpLinkConfig, UdpTransport};

/// Where an outbound frame is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Peer(PeerAddress),
    Broadcast,
}

/// A frame as received from the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw tag byte; may name a packet type this build does not know.
    pub tag: u8,
    pub payload: Payload,
    pub sender: PeerAddress,
}

impl Frame {
    /// Copies `payload` into a frame.
    pub fn new(tag: u8, payload: &[u8], sender: PeerAddress) -> Result<Self, TransportError> {
        let payload = Payload::from_slice(payload).map_err(|_| TransportError::PayloadTooLarge {
            len: payload.len(),
            capacity: MAX_FRAME_PAYLOAD,
        })?;
        Ok(Self { tag, payload, sender })
    }
}

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no endpoint at {0}")]
    Unreachable(PeerAddress),

    #[error("payload of {len} bytes exceeds frame capacity {capacity}")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability to exchange tagged frames with other keyboard halves.
#[async_trait]
pub trait Transport: Send + Sync {
    /// This node's own address.
    fn local_address(&self) -> PeerAddress;

    /// Sends `payload` under `tag`. Fire-and-forget: `Ok` means the frame was
    /// handed to the medium, not that anyone received it.
    async fn send(
        &self,
        tag: PacketType,
        payload: &[u8],
        destination: Destination,
    ) -> Result<(), TransportError>;

    /// Starts delivering inbound frames tagged `tag`. Idempotent.
    fn listen(&self, tag: PacketType);
}
