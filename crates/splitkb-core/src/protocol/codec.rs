//! Binary codec for link packets.
//!
//! Wire format:
//! ```text
//! [tag:1][payload:N]
//! ```
//! | Packet              | Payload                                   |
//! |---------------------|-------------------------------------------|
//! | PairingRequest      | opaque (default: 1 sequence byte)         |
//! | PairingConfirmation | echo of the request payload               |
//! | KeyEvent            | `[index:1][pressed:1]`                    |
//! | KeyBitmap           | `[len:1][len bytes]`                      |
//! | ConfigRequest       | `[filler:1]`                              |
//! | Config              | `[len:u32 LE][len bytes]` per block       |
//!
//! The transport carries the tag separately from the payload, so most
//! callers use [`encode_payload`] / [`decode_payload`]. The `*_frame`
//! variants prepend and strip the tag for byte-oriented media.

use thiserror::Error;

use crate::protocol::config_blob::ConfigBlobError;
use crate::protocol::messages::{
    DeviceConfig, Packet, PacketType, PairingPayload, Payload, RawBitmapEvent, RawKeyEvent,
    CONFIG_REQUEST_FILLER, MAX_BITMAP_BYTES, MAX_FRAME_PAYLOAD, MAX_PAIRING_PAYLOAD,
};

/// Size of a full frame buffer: tag plus the largest payload.
pub const MAX_FRAME_LEN: usize = 1 + MAX_FRAME_PAYLOAD;

/// Inline buffer holding a tagged frame.
pub type FrameBytes = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Errors that can occur during packet encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The payload is shorter than the packet type requires.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The tag byte is not a recognized packet type.
    #[error("unknown packet type: 0x{0:02X}")]
    UnknownPacketType(u8),

    /// A field exceeds the inline buffer that must hold it.
    #[error("payload too large: {len} bytes, capacity is {capacity}")]
    PayloadTooLarge { len: usize, capacity: usize },

    /// The embedded config blob is inconsistent.
    #[error("invalid config payload: {0}")]
    Config(#[from] ConfigBlobError),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes the payload of `packet` (without its tag).
///
/// # Errors
///
/// Returns [`ProtocolError::Config`] when a config's keymap does not match its
/// geometry, and [`ProtocolError::PayloadTooLarge`] if a field cannot fit.
///
/// # Examples
///
/// ```rust
/// use splitkb_core::protocol::{decode_payload, encode_payload};
/// use splitkb_core::protocol::messages::{Packet, RawKeyEvent};
///
/// let packet = Packet::KeyEvent(RawKeyEvent::press(3));
/// let payload = encode_payload(&packet).unwrap();
/// assert_eq!(payload.as_slice(), &[3, 1]);
/// assert_eq!(decode_payload(packet.packet_type(), &payload).unwrap(), packet);
/// ```
pub fn encode_payload(packet: &Packet) -> Result<Payload, ProtocolError> {
    let mut buf = Payload::new();
    match packet {
        Packet::PairingRequest(p) | Packet::PairingConfirmation(p) => put(&mut buf, p)?,
        Packet::KeyEvent(e) => put(&mut buf, &[e.index, u8::from(e.pressed)])?,
        Packet::KeyBitmap(b) => {
            put(&mut buf, &[b.size() as u8])?;
            put(&mut buf, b.as_bytes())?;
        }
        Packet::ConfigRequest => put(&mut buf, &[CONFIG_REQUEST_FILLER])?,
        Packet::Config(c) => buf = c.to_blob()?,
    }
    Ok(buf)
}

/// Decodes a payload received under tag `kind`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the payload is short or inconsistent. Trailing
/// bytes after a fixed-size payload are ignored.
pub fn decode_payload(kind: PacketType, payload: &[u8]) -> Result<Packet, ProtocolError> {
    match kind {
        PacketType::PairingRequest => decode_pairing(payload).map(Packet::PairingRequest),
        PacketType::PairingConfirmation => {
            decode_pairing(payload).map(Packet::PairingConfirmation)
        }
        PacketType::KeyEvent => {
            require_len(payload, RawKeyEvent::WIRE_LEN)?;
            Ok(Packet::KeyEvent(RawKeyEvent {
                index: payload[0],
                pressed: payload[1] != 0,
            }))
        }
        PacketType::KeyBitmap => decode_bitmap(payload).map(Packet::KeyBitmap),
        PacketType::ConfigRequest => Ok(Packet::ConfigRequest),
        PacketType::Config => Ok(Packet::Config(DeviceConfig::from_blob(payload)?)),
    }
}

/// Encodes `packet` with its tag byte in front.
pub fn encode_frame(packet: &Packet) -> Result<FrameBytes, ProtocolError> {
    let payload = encode_payload(packet)?;
    let mut frame = FrameBytes::new();
    put(&mut frame, &[packet.packet_type() as u8])?;
    put(&mut frame, &payload)?;
    Ok(frame)
}

/// Decodes a tagged frame produced by [`encode_frame`].
pub fn decode_frame(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    let (&tag, payload) = bytes.split_first().ok_or(ProtocolError::InsufficientData {
        needed: 1,
        available: 0,
    })?;
    let kind = PacketType::try_from(tag).map_err(|_| ProtocolError::UnknownPacketType(tag))?;
    decode_payload(kind, payload)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn decode_pairing(payload: &[u8]) -> Result<PairingPayload, ProtocolError> {
    PairingPayload::from_slice(payload).map_err(|_| ProtocolError::PayloadTooLarge {
        len: payload.len(),
        capacity: MAX_PAIRING_PAYLOAD,
    })
}

fn decode_bitmap(payload: &[u8]) -> Result<RawBitmapEvent, ProtocolError> {
    require_len(payload, 1)?;
    let len = payload[0] as usize;
    require_len(payload, 1 + len)?;
    RawBitmapEvent::from_bytes(&payload[1..1 + len]).ok_or(ProtocolError::PayloadTooLarge {
        len,
        capacity: MAX_BITMAP_BYTES,
    })
}

fn require_len(payload: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if payload.len() < needed {
        return Err(ProtocolError::InsufficientData {
            needed,
            available: payload.len(),
        });
    }
    Ok(())
}

fn put<const N: usize>(buf: &mut heapless::Vec<u8, N>, bytes: &[u8]) -> Result<(), ProtocolError> {
    buf.extend_from_slice(bytes)
        .map_err(|_| ProtocolError::PayloadTooLarge {
            len: buf.len() + bytes.len(),
            capacity: N,
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pairing(bytes: &[u8]) -> PairingPayload {
        PairingPayload::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_key_event_encodes_index_then_pressed_flag() {
        let payload = encode_payload(&Packet::KeyEvent(RawKeyEvent::release(17))).unwrap();
        assert_eq!(payload.as_slice(), &[17, 0]);
    }

    #[test]
    fn test_key_event_treats_any_nonzero_flag_as_pressed() {
        let packet = decode_payload(PacketType::KeyEvent, &[5, 0x7F]).unwrap();
        assert_eq!(packet, Packet::KeyEvent(RawKeyEvent::press(5)));
    }

    #[test]
    fn test_short_key_event_is_rejected() {
        assert_eq!(
            decode_payload(PacketType::KeyEvent, &[5]),
            Err(ProtocolError::InsufficientData { needed: 2, available: 1 })
        );
    }

    #[test]
    fn test_bitmap_is_length_prefixed() {
        let bitmap = RawBitmapEvent::from_bytes(&[0x81, 0x00, 0x02]).unwrap();
        let payload = encode_payload(&Packet::KeyBitmap(bitmap.clone())).unwrap();

        assert_eq!(payload.as_slice(), &[3, 0x81, 0x00, 0x02]);
        assert_eq!(
            decode_payload(PacketType::KeyBitmap, &payload).unwrap(),
            Packet::KeyBitmap(bitmap)
        );
    }

    #[test]
    fn test_bitmap_with_truncated_body_is_rejected() {
        assert_eq!(
            decode_payload(PacketType::KeyBitmap, &[4, 0xFF, 0xFF]),
            Err(ProtocolError::InsufficientData { needed: 5, available: 3 })
        );
    }

    #[test]
    fn test_empty_bitmap_payload_is_rejected() {
        assert!(matches!(
            decode_payload(PacketType::KeyBitmap, &[]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_oversized_bitmap_is_rejected() {
        let mut payload = vec![40u8];
        payload.extend_from_slice(&[0u8; 40]);
        assert_eq!(
            decode_payload(PacketType::KeyBitmap, &payload),
            Err(ProtocolError::PayloadTooLarge { len: 40, capacity: MAX_BITMAP_BYTES })
        );
    }

    #[test]
    fn test_config_request_carries_single_filler_byte() {
        let payload = encode_payload(&Packet::ConfigRequest).unwrap();
        assert_eq!(payload.as_slice(), &[CONFIG_REQUEST_FILLER]);
    }

    #[test]
    fn test_config_with_bad_block_length_fails_closed() {
        let result = decode_payload(PacketType::Config, &[2, 0, 0, 0, 1, 1, 9, 0, 0, 0, 4]);
        assert!(matches!(
            result,
            Err(ProtocolError::Config(ConfigBlobError::SizeMismatch { index: 1, .. }))
        ));
    }

    #[test]
    fn test_config_with_mismatched_keymap_cannot_be_encoded() {
        let config = DeviceConfig {
            rows: 2,
            cols: 2,
            keymap: heapless::Vec::from_slice(&[4, 5]).unwrap(),
        };
        assert!(matches!(
            encode_payload(&Packet::Config(config)),
            Err(ProtocolError::Config(ConfigBlobError::KeymapSizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_pairing_payload_is_echoed_verbatim() {
        let packet = Packet::PairingConfirmation(pairing(&[0x2A, 0x01]));
        let payload = encode_payload(&packet).unwrap();
        assert_eq!(payload.as_slice(), &[0x2A, 0x01]);
    }

    #[test]
    fn test_oversized_pairing_payload_is_rejected() {
        let payload = [0u8; MAX_PAIRING_PAYLOAD + 1];
        assert!(matches!(
            decode_payload(PacketType::PairingRequest, &payload),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_frame_prepends_tag() {
        let frame = encode_frame(&Packet::KeyEvent(RawKeyEvent::press(2))).unwrap();
        assert_eq!(frame.as_slice(), &[PacketType::KeyEvent as u8, 2, 1]);
    }

    #[test]
    fn test_decode_frame_rejects_unknown_tag() {
        assert_eq!(
            decode_frame(&[0x99, 0]),
            Err(ProtocolError::UnknownPacketType(0x99))
        );
    }

    #[test]
    fn test_decode_frame_rejects_empty_input() {
        assert_eq!(
            decode_frame(&[]),
            Err(ProtocolError::InsufficientData { needed: 1, available: 0 })
        );
    }
}
