//! UDP emulation of the broadcast radio medium.
//!
//! Every frame is fanned out as one datagram to each address in the
//! configured `medium` list (typically a LAN broadcast address, or the other
//! halves' sockets when testing on one machine):
//!
//! ```text
//! [src:6][dst:6][tag:1][payload:N]
//! ```
//!
//! Receivers keep datagrams whose destination is their own address or the
//! broadcast address, drop their own echoes, and filter on listened tags.
//! UDP already gives the same guarantees as the radio: none.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use super::{Destination, Frame, Transport, TransportError};
use crate::peer::address::{PeerAddress, ADDRESS_LEN};
use crate::protocol::messages::{PacketType, MAX_FRAME_PAYLOAD};

const HEADER_LEN: usize = 2 * ADDRESS_LEN + 1;
const MAX_DATAGRAM: usize = HEADER_LEN + MAX_FRAME_PAYLOAD;
const RECEIVE_QUEUE: usize = 64;

type Datagram = heapless::Vec<u8, MAX_DATAGRAM>;

/// Socket settings for the UDP medium.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UdpLinkConfig {
    /// Local socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Every datagram is sent to each of these addresses.
    #[serde(default = "default_medium")]
    pub medium: Vec<SocketAddr>,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 47100))
}

fn default_medium() -> Vec<SocketAddr> {
    vec![SocketAddr::from(([255, 255, 255, 255], 47100))]
}

impl Default for UdpLinkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            medium: default_medium(),
        }
    }
}

/// A [`Transport`] over a UDP socket.
pub struct UdpTransport {
    address: PeerAddress,
    socket: Arc<UdpSocket>,
    medium: Vec<SocketAddr>,
    listening: Arc<AtomicU8>,
}

impl UdpTransport {
    /// Binds the socket and spawns the receive task.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the socket cannot be bound.
    pub async fn bind(
        address: PeerAddress,
        config: &UdpLinkConfig,
    ) -> Result<(Self, mpsc::Receiver<Frame>), TransportError> {
        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: config.bind,
                source,
            })?;
        socket.set_broadcast(true)?;
        let socket = Arc::new(socket);
        let listening = Arc::new(AtomicU8::new(0));

        let (tx, rx) = mpsc::channel(RECEIVE_QUEUE);
        tokio::spawn(receive_loop(
            Arc::clone(&socket),
            address,
            Arc::clone(&listening),
            tx,
        ));

        info!(%address, bind = %config.bind, "udp link up");
        let transport = Self {
            address,
            socket,
            medium: config.medium.clone(),
            listening,
        };
        Ok((transport, rx))
    }

    /// The socket address actually bound (useful with port 0).
    pub fn local_socket_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_address(&self) -> PeerAddress {
        self.address
    }

    async fn send(
        &self,
        tag: PacketType,
        payload: &[u8],
        destination: Destination,
    ) -> Result<(), TransportError> {
        let dst = match destination {
            Destination::Peer(address) => address,
            Destination::Broadcast => PeerAddress::BROADCAST,
        };
        let datagram = encode_datagram(self.address, dst, tag as u8, payload)?;

        let mut last_error = None;
        let mut delivered = 0usize;
        for target in &self.medium {
            match self.socket.send_to(&datagram, target).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(%target, "udp send failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if delivered == 0 => Err(TransportError::Io(e)),
            _ => Ok(()),
        }
    }

    fn listen(&self, tag: PacketType) {
        self.listening.fetch_or(tag.mask(), Ordering::Relaxed);
    }
}

fn encode_datagram(
    src: PeerAddress,
    dst: PeerAddress,
    tag: u8,
    payload: &[u8],
) -> Result<Datagram, TransportError> {
    let too_large = || TransportError::PayloadTooLarge {
        len: payload.len(),
        capacity: MAX_FRAME_PAYLOAD,
    };
    let mut datagram = Datagram::new();
    datagram.extend_from_slice(src.as_bytes()).map_err(|_| too_large())?;
    datagram.extend_from_slice(dst.as_bytes()).map_err(|_| too_large())?;
    datagram.push(tag).map_err(|_| too_large())?;
    datagram.extend_from_slice(payload).map_err(|_| too_large())?;
    Ok(datagram)
}

/// Splits a datagram into `(src, dst, tag, payload)`.
fn parse_datagram(bytes: &[u8]) -> Option<(PeerAddress, PeerAddress, u8, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let src = PeerAddress::from_slice(&bytes[..ADDRESS_LEN])?;
    let dst = PeerAddress::from_slice(&bytes[ADDRESS_LEN..2 * ADDRESS_LEN])?;
    Some((src, dst, bytes[2 * ADDRESS_LEN], &bytes[HEADER_LEN..]))
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    local: PeerAddress,
    listening: Arc<AtomicU8>,
    tx: mpsc::Sender<Frame>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms.
                debug!("udp recv error: {e}");
                continue;
            }
        };

        let Some((src, dst, tag, payload)) = parse_datagram(&buf[..len]) else {
            trace!(%from, len, "runt datagram dropped");
            continue;
        };
        if src == local || (dst != local && !dst.is_broadcast()) {
            continue;
        }
        let wanted = PacketType::try_from(tag).map_or(0, PacketType::mask);
        if listening.load(Ordering::Relaxed) & wanted == 0 {
            continue;
        }
        let frame = match Frame::new(tag, payload, src) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%src, "oversized datagram dropped: {e}");
                continue;
            }
        };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!(%src, "receive queue full, frame lost"),
            Err(TrySendError::Closed(_)) => {
                debug!(%local, "frame receiver dropped, stopping udp receive loop");
                break;
            }
        }
    }
}
