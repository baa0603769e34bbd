//! In-process broadcast medium.
//!
//! Every endpoint attached to a [`MemoryBus`] sees broadcasts from every other
//! endpoint and unicasts addressed to it, filtered by the tags it listens on.
//! Each endpoint has a bounded receive queue; a full queue drops the frame,
//! which mirrors a radio that cannot keep up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use super::{Destination, Frame, Transport, TransportError};
use crate::peer::PeerAddress;
use crate::protocol::messages::{PacketMask, PacketType};

/// Receive queue depth per endpoint.
pub const ENDPOINT_QUEUE: usize = 64;

struct Endpoint {
    tx: mpsc::Sender<Frame>,
    listening: PacketMask,
}

/// A shared medium. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct MemoryBus {
    endpoints: Arc<Mutex<HashMap<PeerAddress, Endpoint>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a node at `address`, replacing any endpoint already there.
    pub fn attach(&self, address: PeerAddress) -> (MemoryTransport, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(ENDPOINT_QUEUE);
        self.lock().insert(
            address,
            Endpoint {
                tx,
                listening: PacketMask::empty(),
            },
        );
        let transport = MemoryTransport {
            address,
            bus: self.clone(),
        };
        (transport, rx)
    }

    /// Removes the node at `address`; frames to it are then unreachable.
    pub fn detach(&self, address: PeerAddress) {
        self.lock().remove(&address);
    }

    pub fn is_attached(&self, address: PeerAddress) -> bool {
        self.lock().contains_key(&address)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerAddress, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(endpoint: &Endpoint, frame: Frame) {
    if !endpoint.listening.contains_tag(frame.tag) {
        return;
    }
    match endpoint.tx.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            trace!(tag = frame.tag, sender = %frame.sender, "receive queue full, frame lost");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// One node's view of a [`MemoryBus`].
pub struct MemoryTransport {
    address: PeerAddress,
    bus: MemoryBus,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_address(&self) -> PeerAddress {
        self.address
    }

    async fn send(
        &self,
        tag: PacketType,
        payload: &[u8],
        destination: Destination,
    ) -> Result<(), TransportError> {
        let frame = Frame::new(tag as u8, payload, self.address)?;
        let endpoints = self.bus.lock();
        match destination {
            Destination::Broadcast => {
                for (address, endpoint) in endpoints.iter() {
                    if *address != self.address {
                        deliver(endpoint, frame.clone());
                    }
                }
            }
            Destination::Peer(address) => {
                let endpoint = endpoints
                    .get(&address)
                    .ok_or(TransportError::Unreachable(address))?;
                deliver(endpoint, frame);
            }
        }
        Ok(())
    }

    fn listen(&self, tag: PacketType) {
        if let Some(endpoint) = self.bus.lock().get_mut(&self.address) {
            endpoint.listening.insert(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x02, 0, 0, 0, 0, last])
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_listening_target() {
        let bus = MemoryBus::new();
        let (a, _rx_a) = bus.attach(addr(1));
        let (b, mut rx_b) = bus.attach(addr(2));
        b.listen(PacketType::KeyEvent);

        a.send(PacketType::KeyEvent, &[1, 1], Destination::Peer(addr(2)))
            .await
            .unwrap();

        let frame = rx_b.recv().await.unwrap();
        assert_eq!(frame.tag, PacketType::KeyEvent as u8);
        assert_eq!(frame.sender, addr(1));
        assert_eq!(frame.payload.as_slice(), &[1, 1]);
    }

    #[tokio::test]
    async fn test_unlistened_tags_are_filtered() {
        let bus = MemoryBus::new();
        let (a, _rx_a) = bus.attach(addr(1));
        let (b, mut rx_b) = bus.attach(addr(2));
        b.listen(PacketType::Config);

        a.send(PacketType::KeyEvent, &[1, 1], Destination::Peer(addr(2)))
            .await
            .unwrap();

        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let bus = MemoryBus::new();
        let (a, mut rx_a) = bus.attach(addr(1));
        let (b, mut rx_b) = bus.attach(addr(2));
        let (c, mut rx_c) = bus.attach(addr(3));
        for t in [&a, &b, &c] {
            t.listen(PacketType::PairingRequest);
        }

        a.send(PacketType::PairingRequest, &[0], Destination::Broadcast)
            .await
            .unwrap();

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unicast_to_detached_peer_is_unreachable() {
        let bus = MemoryBus::new();
        let (a, _rx_a) = bus.attach(addr(1));
        let (_b, _rx_b) = bus.attach(addr(2));
        bus.detach(addr(2));

        let result = a
            .send(PacketType::KeyEvent, &[0, 1], Destination::Peer(addr(2)))
            .await;

        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_full_queue_drops_frames_instead_of_blocking() {
        let bus = MemoryBus::new();
        let (a, _rx_a) = bus.attach(addr(1));
        let (b, mut rx_b) = bus.attach(addr(2));
        b.listen(PacketType::KeyEvent);

        for _ in 0..ENDPOINT_QUEUE + 10 {
            a.send(PacketType::KeyEvent, &[0, 1], Destination::Peer(addr(2)))
                .await
                .unwrap();
        }

        let mut received = 0;
        while rx_b.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, ENDPOINT_QUEUE);
    }
}
