//! TransportProtocol: typed send operations and inbound dispatch over a [`Transport`].
//!
//! The protocol owns the node's [`PeerRegistry`]. Outbound operations resolve
//! peer ids to addresses and encode packets. Inbound frames go through
//! [`TransportProtocol::dispatch`], which:
//!
//! 1. drops frames whose kind nobody subscribed to,
//! 2. registers the sender if its address is new (an unpaired peripheral
//!    only accepts new addresses from pairing confirmations),
//! 3. decodes the payload, logging and dropping it on failure,
//! 4. returns an [`Inbound`] for the owning controller to `match` on.
//!
//! Nothing here retransmits, reorders, or deduplicates.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::peer::{PeerAddress, PeerId, PeerRegistry, Role, MASTER_ID};
use crate::protocol::codec::{decode_payload, encode_payload, ProtocolError};
use crate::protocol::messages::{
    DeviceConfig, Packet, PacketMask, PacketType, PairingPayload, RawBitmapEvent, RawKeyEvent,
    MAX_PAIRING_PAYLOAD,
};
use crate::protocol::sequence::PairingSequence;
use crate::transport::{Destination, Frame, Transport, TransportError};

/// Errors returned by outbound protocol operations.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no address known for peer id {0}")]
    UnknownPeer(PeerId),
}

/// A decoded packet together with the id of the peer that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender: PeerId,
    pub packet: Packet,
}

pub struct TransportProtocol {
    transport: Arc<dyn Transport>,
    role: Role,
    registry: PeerRegistry,
    subscriptions: PacketMask,
    sequence: PairingSequence,
}

impl TransportProtocol {
    /// Creates the protocol for a node playing `role`.
    ///
    /// A master binds its own address to id 0; a peripheral learns the
    /// master's address from the first pairing confirmation.
    pub fn new(transport: Arc<dyn Transport>, role: Role) -> Self {
        let registry = match role {
            Role::Master => PeerRegistry::with_master(transport.local_address()),
            Role::Peripheral => PeerRegistry::new(),
        };
        Self::with_registry(transport, role, registry)
    }

    /// Creates the protocol around a previously saved registry.
    pub fn with_registry(transport: Arc<dyn Transport>, role: Role, registry: PeerRegistry) -> Self {
        Self {
            transport,
            role,
            registry,
            subscriptions: PacketMask::empty(),
            sequence: PairingSequence::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_address(&self) -> PeerAddress {
        self.transport.local_address()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    /// Starts delivering inbound packets of `kind`.
    ///
    /// Also enables the tag on the underlying transport. Subscribing twice is
    /// the same as subscribing once.
    pub fn subscribe(&mut self, kind: PacketType) {
        self.subscriptions.insert(kind);
        self.transport.listen(kind);
    }

    pub fn on_key_event(&mut self) {
        self.subscribe(PacketType::KeyEvent);
    }

    pub fn on_bitmap_event(&mut self) {
        self.subscribe(PacketType::KeyBitmap);
    }

    pub fn on_config_request(&mut self) {
        self.subscribe(PacketType::ConfigRequest);
    }

    pub fn on_config_received(&mut self) {
        self.subscribe(PacketType::Config);
    }

    pub fn on_pairing_request(&mut self) {
        self.subscribe(PacketType::PairingRequest);
    }

    pub fn on_pairing_confirmation(&mut self) {
        self.subscribe(PacketType::PairingConfirmation);
    }

    pub fn is_subscribed(&self, kind: PacketType) -> bool {
        self.subscriptions.contains(kind)
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Sends one key transition to the master.
    pub async fn send_key_event(&self, event: RawKeyEvent) -> Result<(), LinkError> {
        self.send_to(MASTER_ID, &Packet::KeyEvent(event)).await
    }

    /// Sends a full matrix snapshot to the master.
    pub async fn send_bitmap_event(&self, event: &RawBitmapEvent) -> Result<(), LinkError> {
        self.send_to(MASTER_ID, &Packet::KeyBitmap(event.clone())).await
    }

    /// Asks peer `id` for its configuration.
    pub async fn request_config(&self, id: PeerId) -> Result<(), LinkError> {
        self.send_to(id, &Packet::ConfigRequest).await
    }

    /// Sends `config` to peer `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Protocol`] wrapping a config error if the keymap
    /// does not match the matrix geometry; nothing is sent in that case.
    pub async fn push_config(&self, id: PeerId, config: &DeviceConfig) -> Result<(), LinkError> {
        self.send_to(id, &Packet::Config(config.clone())).await
    }

    /// Broadcasts a pairing request.
    ///
    /// Without an explicit payload, a single byte from the pairing sequence
    /// counter is sent.
    pub async fn send_pairing_request(&self, payload: Option<&[u8]>) -> Result<(), LinkError> {
        let payload = match payload {
            Some(bytes) => pairing_payload(bytes)?,
            None => pairing_payload(&[self.sequence.next()])?,
        };
        let packet = Packet::PairingRequest(payload);
        let bytes = encode_payload(&packet)?;
        self.transport
            .send(PacketType::PairingRequest, &bytes, Destination::Broadcast)
            .await?;
        Ok(())
    }

    /// Answers a pairing request from peer `id`, echoing its payload.
    pub async fn send_pairing_confirmation(
        &self,
        id: PeerId,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let packet = Packet::PairingConfirmation(pairing_payload(payload)?);
        self.send_to(id, &packet).await
    }

    async fn send_to(&self, id: PeerId, packet: &Packet) -> Result<(), LinkError> {
        let address = self.registry.address_of(id);
        if address.is_zero() {
            return Err(LinkError::UnknownPeer(id));
        }
        let payload = encode_payload(packet)?;
        self.transport
            .send(packet.packet_type(), &payload, Destination::Peer(address))
            .await?;
        trace!(id, kind = ?packet.packet_type(), len = payload.len(), "sent");
        Ok(())
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Processes one received frame.
    ///
    /// Returns `None` when the frame is dropped: unknown or unsubscribed kind,
    /// full registry, or a payload that fails to decode.
    pub fn dispatch(&mut self, frame: &Frame) -> Option<Inbound> {
        let Ok(kind) = PacketType::try_from(frame.tag) else {
            debug!(tag = frame.tag, sender = %frame.sender, "unknown packet tag dropped");
            return None;
        };
        if !self.subscriptions.contains(kind) {
            trace!(?kind, "unsubscribed packet dropped");
            return None;
        }

        let sender = self.register_sender(kind, frame.sender)?;

        match decode_payload(kind, &frame.payload) {
            Ok(packet) => Some(Inbound { sender, packet }),
            Err(e) => {
                warn!(sender, ?kind, "dropping malformed packet: {e}");
                None
            }
        }
    }

    /// A peripheral without a master only learns new addresses from pairing
    /// confirmations.
    fn register_sender(&mut self, kind: PacketType, address: PeerAddress) -> Option<PeerId> {
        if self.role == Role::Peripheral && self.registry.master().is_none() {
            if kind == PacketType::PairingConfirmation {
                return self.registry.register_master(address);
            }
            if self.registry.id_of(address).is_none() {
                debug!(%address, ?kind, "packet from unknown node before pairing dropped");
                return None;
            }
        }
        self.registry.register(address)
    }
}

fn pairing_payload(bytes: &[u8]) -> Result<PairingPayload, ProtocolError> {
    PairingPayload::from_slice(bytes).map_err(|_| ProtocolError::PayloadTooLarge {
        len: bytes.len(),
        capacity: MAX_PAIRING_PAYLOAD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBus;

    const MASTER: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0xAA]);
    const LEFT: PeerAddress = PeerAddress::new([0x02, 0, 0, 0, 0, 0x01]);

    fn frame(kind: PacketType, payload: &[u8], sender: PeerAddress) -> Frame {
        Frame::new(kind as u8, payload, sender).unwrap()
    }

    fn master_protocol(bus: &MemoryBus) -> TransportProtocol {
        let (transport, _rx) = bus.attach(MASTER);
        TransportProtocol::new(Arc::new(transport), Role::Master)
    }

    #[test]
    fn test_master_binds_own_address_to_id_zero() {
        let bus = MemoryBus::new();
        let protocol = master_protocol(&bus);
        assert_eq!(protocol.registry().id_of(MASTER), Some(MASTER_ID));
    }

    #[test]
    fn test_unsubscribed_kind_is_dropped_without_registration() {
        let bus = MemoryBus::new();
        let mut protocol = master_protocol(&bus);

        let result = protocol.dispatch(&frame(PacketType::KeyEvent, &[0, 1], LEFT));

        assert!(result.is_none());
        assert_eq!(protocol.registry().id_of(LEFT), None);
    }

    #[test]
    fn test_dispatch_registers_sender_and_decodes() {
        let bus = MemoryBus::new();
        let mut protocol = master_protocol(&bus);
        protocol.on_key_event();

        let inbound = protocol
            .dispatch(&frame(PacketType::KeyEvent, &[4, 1], LEFT))
            .unwrap();

        assert_eq!(inbound.sender, 1);
        assert_eq!(inbound.packet, Packet::KeyEvent(RawKeyEvent::press(4)));
        assert_eq!(protocol.registry().address_of(1), LEFT);
    }

    #[test]
    fn test_malformed_payload_still_registers_but_is_not_delivered() {
        let bus = MemoryBus::new();
        let mut protocol = master_protocol(&bus);
        protocol.on_key_event();

        let result = protocol.dispatch(&frame(PacketType::KeyEvent, &[4], LEFT));

        assert!(result.is_none());
        assert_eq!(protocol.registry().id_of(LEFT), Some(1));
    }

    #[test]
    fn test_unknown_tag_is_dropped() {
        let bus = MemoryBus::new();
        let mut protocol = master_protocol(&bus);
        let unknown = Frame::new(0x7E, &[1], LEFT).unwrap();
        assert!(protocol.dispatch(&unknown).is_none());
    }

    #[test]
    fn test_peripheral_records_confirming_node_as_master() {
        let bus = MemoryBus::new();
        let (transport, _rx) = bus.attach(LEFT);
        let mut protocol = TransportProtocol::new(Arc::new(transport), Role::Peripheral);
        protocol.on_pairing_confirmation();

        let inbound = protocol
            .dispatch(&frame(PacketType::PairingConfirmation, &[0], MASTER))
            .unwrap();

        assert_eq!(inbound.sender, MASTER_ID);
        assert_eq!(protocol.registry().master(), Some(MASTER));
    }

    #[test]
    fn test_config_request_before_confirmation_keeps_master_at_id_zero() {
        // Arrange: the confirmation is lost, so the master's config request
        // reaches the peripheral first.
        let bus = MemoryBus::new();
        let (transport, _rx) = bus.attach(LEFT);
        let mut protocol = TransportProtocol::new(Arc::new(transport), Role::Peripheral);
        protocol.on_pairing_confirmation();
        protocol.on_config_request();

        // Act
        let early = protocol.dispatch(&frame(PacketType::ConfigRequest, &[0], MASTER));
        let confirmation = protocol
            .dispatch(&frame(PacketType::PairingConfirmation, &[0], MASTER))
            .unwrap();
        let later = protocol
            .dispatch(&frame(PacketType::ConfigRequest, &[0], MASTER))
            .unwrap();

        // Assert
        assert!(early.is_none());
        assert_eq!(confirmation.sender, MASTER_ID);
        assert_eq!(later.sender, MASTER_ID);
        let entries: Vec<_> = protocol
            .registry()
            .peers()
            .filter(|peer| peer.address == MASTER)
            .collect();
        assert_eq!(entries.len(), 1, "address registered under two ids: {entries:?}");
        assert_eq!(protocol.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails_without_sending() {
        let bus = MemoryBus::new();
        let protocol = master_protocol(&bus);

        let result = protocol.request_config(5).await;

        assert!(matches!(result, Err(LinkError::UnknownPeer(5))));
    }

    #[tokio::test]
    async fn test_peripheral_cannot_send_keys_before_pairing() {
        let bus = MemoryBus::new();
        let (transport, _rx) = bus.attach(LEFT);
        let protocol = TransportProtocol::new(Arc::new(transport), Role::Peripheral);

        let result = protocol.send_key_event(RawKeyEvent::press(0)).await;

        assert!(matches!(result, Err(LinkError::UnknownPeer(MASTER_ID))));
    }

    #[tokio::test]
    async fn test_default_pairing_payload_is_one_sequence_byte() {
        let bus = MemoryBus::new();
        let (transport, _rx) = bus.attach(LEFT);
        let protocol = TransportProtocol::new(Arc::new(transport), Role::Peripheral);
        let (listener, mut rx) = bus.attach(MASTER);
        listener.listen(PacketType::PairingRequest);

        protocol.send_pairing_request(None).await.unwrap();
        protocol.send_pairing_request(None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().payload.as_slice(), &[0]);
        assert_eq!(rx.recv().await.unwrap().payload.as_slice(), &[1]);
    }
}
