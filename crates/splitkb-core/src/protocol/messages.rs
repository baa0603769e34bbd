//! All link packet types exchanged between keyboard halves.
//!
//! Every packet travels as `[tag:1][payload:N]`. Multi-byte integers are
//! little-endian. Payloads live in fixed-capacity inline buffers so that no
//! per-event heap allocation happens between the radio and the controller.

use crate::keymap::{HID_BITMAP_BYTES, MAX_KEYS};

// ── Capacity constants ────────────────────────────────────────────────────────

/// Largest bitmap snapshot a peripheral may send (one bit per key).
pub const MAX_BITMAP_BYTES: usize = HID_BITMAP_BYTES;

/// Largest opaque payload accepted in pairing packets.
pub const MAX_PAIRING_PAYLOAD: usize = 32;

/// Largest payload of any single frame (a full config blob fits).
pub const MAX_FRAME_PAYLOAD: usize = 320;

/// Payload byte sent with a config request.
pub const CONFIG_REQUEST_FILLER: u8 = 0x00;

/// Inline buffer used for raw payloads.
pub type Payload = heapless::Vec<u8, MAX_FRAME_PAYLOAD>;

/// Inline buffer holding a pairing payload.
pub type PairingPayload = heapless::Vec<u8, MAX_PAIRING_PAYLOAD>;

/// Local-key-index → HID usage code table.
pub type Keymap = heapless::Vec<u8, MAX_KEYS>;

// ── Packet type tags ──────────────────────────────────────────────────────────

/// Tag byte identifying a packet's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    PairingRequest = 0x01,
    PairingConfirmation = 0x02,
    KeyEvent = 0x03,
    KeyBitmap = 0x04,
    ConfigRequest = 0x05,
    Config = 0x06,
}

impl PacketType {
    pub const ALL: [PacketType; 6] = [
        PacketType::PairingRequest,
        PacketType::PairingConfirmation,
        PacketType::KeyEvent,
        PacketType::KeyBitmap,
        PacketType::ConfigRequest,
        PacketType::Config,
    ];

    /// Single-bit mask for this tag, used by listen sets.
    pub const fn mask(self) -> u8 {
        1 << (self as u8)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(PacketType::PairingRequest),
            0x02 => Ok(PacketType::PairingConfirmation),
            0x03 => Ok(PacketType::KeyEvent),
            0x04 => Ok(PacketType::KeyBitmap),
            0x05 => Ok(PacketType::ConfigRequest),
            0x06 => Ok(PacketType::Config),
            _ => Err(()),
        }
    }
}

/// Set of packet types, one bit per [`PacketType`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMask(u8);

impl PacketMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, kind: PacketType) {
        self.0 |= kind.mask();
    }

    pub fn contains(&self, kind: PacketType) -> bool {
        self.0 & kind.mask() != 0
    }

    /// Checks a raw tag byte; unknown tags are never contained.
    pub fn contains_tag(&self, tag: u8) -> bool {
        PacketType::try_from(tag).map_or(false, |kind| self.contains(kind))
    }
}

// ── Payload structs ───────────────────────────────────────────────────────────

/// One matrix cell transition, indexed in the peripheral's local numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub index: u8,
    pub pressed: bool,
}

impl RawKeyEvent {
    /// Encoded size on the wire.
    pub const WIRE_LEN: usize = 2;

    pub fn press(index: u8) -> Self {
        Self { index, pressed: true }
    }

    pub fn release(index: u8) -> Self {
        Self { index, pressed: false }
    }
}

/// Full snapshot of a peripheral's matrix, bit-packed and row-major.
///
/// Key `i` lives in byte `i / 8`, bit `i % 8` (least significant first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBitmapEvent {
    data: heapless::Vec<u8, MAX_BITMAP_BYTES>,
}

impl RawBitmapEvent {
    /// Builds a snapshot from packed bytes.
    ///
    /// Returns `None` if `bytes` exceeds [`MAX_BITMAP_BYTES`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        heapless::Vec::from_slice(bytes).ok().map(|data| Self { data })
    }

    /// Builds a zeroed snapshot large enough for `keys` keys.
    pub fn with_keys(keys: usize) -> Option<Self> {
        let len = keys.div_ceil(8);
        let mut data = heapless::Vec::new();
        data.resize(len, 0).ok()?;
        Some(Self { data })
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        self.data
            .get(index / 8)
            .map_or(false, |byte| byte & (1 << (index % 8)) != 0)
    }

    /// Sets the state of key `index`. Indices past the end are ignored.
    pub fn set(&mut self, index: usize, pressed: bool) {
        if let Some(byte) = self.data.get_mut(index / 8) {
            if pressed {
                *byte |= 1 << (index % 8);
            } else {
                *byte &= !(1 << (index % 8));
            }
        }
    }
}

/// A peripheral's configuration as carried in a `Config` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub rows: u8,
    pub cols: u8,
    pub keymap: Keymap,
}

impl DeviceConfig {
    /// Number of keys implied by the matrix geometry.
    pub fn key_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

// ── Top-level packet enum ─────────────────────────────────────────────────────

/// Every packet that can cross the link, discriminated by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    PairingRequest(PairingPayload),
    PairingConfirmation(PairingPayload),
    KeyEvent(RawKeyEvent),
    KeyBitmap(RawBitmapEvent),
    ConfigRequest,
    Config(DeviceConfig),
}

impl Packet {
    /// Returns the [`PacketType`] tag for this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::PairingRequest(_) => PacketType::PairingRequest,
            Packet::PairingConfirmation(_) => PacketType::PairingConfirmation,
            Packet::KeyEvent(_) => PacketType::KeyEvent,
            Packet::KeyBitmap(_) => PacketType::KeyBitmap,
            Packet::ConfigRequest => PacketType::ConfigRequest,
            Packet::Config(_) => PacketType::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_round_trips_through_u8() {
        for kind in PacketType::ALL {
            assert_eq!(PacketType::try_from(kind as u8), Ok(kind));
        }
        assert!(PacketType::try_from(0x00).is_err());
        assert!(PacketType::try_from(0x07).is_err());
    }

    #[test]
    fn test_packet_mask_tracks_inserted_kinds() {
        let mut mask = PacketMask::empty();
        mask.insert(PacketType::KeyEvent);

        assert!(mask.contains(PacketType::KeyEvent));
        assert!(!mask.contains(PacketType::Config));
        assert!(mask.contains_tag(0x03));
        assert!(!mask.contains_tag(0xFF));
    }

    #[test]
    fn test_bitmap_set_and_query_use_lsb_first_order() {
        let mut bitmap = RawBitmapEvent::with_keys(12).unwrap();
        assert_eq!(bitmap.size(), 2);

        bitmap.set(0, true);
        bitmap.set(9, true);

        assert_eq!(bitmap.as_bytes(), &[0b0000_0001, 0b0000_0010]);
        assert!(bitmap.is_pressed(9));
        assert!(!bitmap.is_pressed(8));
    }

    #[test]
    fn test_bitmap_rejects_oversized_snapshot() {
        assert!(RawBitmapEvent::from_bytes(&[0u8; MAX_BITMAP_BYTES + 1]).is_none());
        assert!(RawBitmapEvent::with_keys(MAX_BITMAP_BYTES * 8 + 1).is_none());
    }

    #[test]
    fn test_bitmap_set_past_end_is_ignored() {
        let mut bitmap = RawBitmapEvent::with_keys(8).unwrap();
        bitmap.set(40, true);
        assert_eq!(bitmap.as_bytes(), &[0]);
    }

    #[test]
    fn test_packet_type_matches_variant() {
        assert_eq!(Packet::ConfigRequest.packet_type(), PacketType::ConfigRequest);
        assert_eq!(
            Packet::KeyEvent(RawKeyEvent::press(1)).packet_type(),
            PacketType::KeyEvent
        );
    }
}
