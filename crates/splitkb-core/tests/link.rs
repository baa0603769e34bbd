//! Integration tests for TransportProtocol over the in-memory bus: pairing
//! handshake, id assignment and config exchange between real endpoints.

use std::sync::Arc;

use splitkb_core::peer::{PeerAddress, Role, MASTER_ID};
use splitkb_core::protocol::{DeviceConfig, Inbound, Packet, PacketType, RawKeyEvent};
use splitkb_core::transport::{Destination, Frame, MemoryBus, Transport};
use splitkb_core::TransportProtocol;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

const MASTER: PeerAddress = PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x10]);
const LEFT: PeerAddress = PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x21]);
const RIGHT: PeerAddress = PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x22]);

struct Node {
    protocol: TransportProtocol,
    rx: mpsc::Receiver<Frame>,
}

impl Node {
    fn master(bus: &MemoryBus) -> Self {
        let (transport, rx) = bus.attach(MASTER);
        let mut protocol = TransportProtocol::new(Arc::new(transport), Role::Master);
        protocol.on_key_event();
        protocol.on_bitmap_event();
        protocol.on_pairing_request();
        protocol.on_config_received();
        Self { protocol, rx }
    }

    fn peripheral(bus: &MemoryBus, address: PeerAddress) -> Self {
        let (transport, rx) = bus.attach(address);
        let mut protocol = TransportProtocol::new(Arc::new(transport), Role::Peripheral);
        protocol.on_pairing_confirmation();
        protocol.on_config_request();
        Self { protocol, rx }
    }

    async fn next(&mut self) -> Option<Inbound> {
        let frame = self.rx.recv().await?;
        self.protocol.dispatch(&frame)
    }

    /// Consumes a pairing request and confirms it, as the master controller does.
    async fn confirm_next_request(&mut self) -> u8 {
        let inbound = self.next().await.expect("pairing request");
        let payload = match inbound.packet {
            Packet::PairingRequest(payload) => payload,
            other => panic!("expected pairing request, got {other:?}"),
        };
        self.protocol
            .send_pairing_confirmation(inbound.sender, &payload)
            .await
            .expect("confirmation sent");
        inbound.sender
    }
}

#[tokio::test]
async fn test_pairing_handshake_assigns_ids_in_arrival_order() {
    // Arrange
    let bus = MemoryBus::new();
    let mut master = Node::master(&bus);
    let mut left = Node::peripheral(&bus, LEFT);
    let mut right = Node::peripheral(&bus, RIGHT);

    // Act
    assert_ok!(left.protocol.send_pairing_request(None).await);
    let left_id = master.confirm_next_request().await;
    assert_ok!(right.protocol.send_pairing_request(None).await);
    let right_id = master.confirm_next_request().await;

    let left_confirm = left.next().await.unwrap();
    let right_confirm = right.next().await.unwrap();

    // Assert
    assert_eq!((left_id, right_id), (1, 2));
    assert_eq!(left_confirm.sender, MASTER_ID);
    assert_eq!(right_confirm.sender, MASTER_ID);
    assert_eq!(left.protocol.registry().master(), Some(MASTER));
    assert_eq!(master.protocol.registry().address_of(left_id), LEFT);
    assert_eq!(master.protocol.registry().id_of(RIGHT), Some(right_id));
}

#[tokio::test]
async fn test_repeated_pairing_request_keeps_id_and_echoes_payload() {
    // Arrange
    let bus = MemoryBus::new();
    let mut master = Node::master(&bus);
    let mut left = Node::peripheral(&bus, LEFT);

    // Act
    assert_ok!(left.protocol.send_pairing_request(Some(&[9, 9])).await);
    let first = master.confirm_next_request().await;
    assert_ok!(left.protocol.send_pairing_request(Some(&[9, 9])).await);
    let second = master.confirm_next_request().await;
    let echo = left.next().await.unwrap();

    // Assert
    assert_eq!(first, second);
    assert_eq!(master.protocol.registry().len(), 2);
    match echo.packet {
        Packet::PairingConfirmation(payload) => assert_eq!(payload.as_slice(), &[9, 9]),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_key_event_reaches_master_after_pairing() {
    // Arrange
    let bus = MemoryBus::new();
    let mut master = Node::master(&bus);
    let mut left = Node::peripheral(&bus, LEFT);
    assert_ok!(left.protocol.send_pairing_request(None).await);
    master.confirm_next_request().await;
    left.next().await.unwrap();

    // Act
    left.protocol
        .send_key_event(RawKeyEvent::press(3))
        .await
        .unwrap();
    let inbound = master.next().await.unwrap();

    // Assert
    assert_eq!(inbound.sender, 1);
    assert_eq!(inbound.packet, Packet::KeyEvent(RawKeyEvent::press(3)));
}

#[tokio::test]
async fn test_config_request_and_reply_round_trip() {
    // Arrange
    let bus = MemoryBus::new();
    let mut master = Node::master(&bus);
    let mut left = Node::peripheral(&bus, LEFT);
    assert_ok!(left.protocol.send_pairing_request(None).await);
    let left_id = master.confirm_next_request().await;
    left.next().await.unwrap();
    let config = DeviceConfig::new(1, 3, &[0x04, 0x05, 0x06]).unwrap();

    // Act
    assert_ok!(master.protocol.request_config(left_id).await);
    let request = left.next().await.unwrap();
    assert_eq!(request.packet, Packet::ConfigRequest);
    assert_ok!(left.protocol.push_config(request.sender, &config).await);
    let reply = master.next().await.unwrap();

    // Assert
    assert_eq!(reply.sender, left_id);
    assert_eq!(reply.packet, Packet::Config(config));
}

#[tokio::test]
async fn test_malformed_config_is_dropped() {
    // Arrange
    let bus = MemoryBus::new();
    let mut master = Node::master(&bus);
    let (rogue, _rx) = bus.attach(RIGHT);

    // Act: declared block length runs past the end of the payload.
    rogue
        .send(
            PacketType::Config,
            &[0xFF, 0, 0, 0, 1, 2],
            Destination::Peer(MASTER),
        )
        .await
        .unwrap();
    let frame = master.rx.recv().await.unwrap();

    // Assert
    assert!(master.protocol.dispatch(&frame).is_none());
}
