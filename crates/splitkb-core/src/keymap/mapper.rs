//! HidMapper: per-peripheral local-index → HID usage tables and the aggregate
//! bitmap of every usage currently held across all peripherals.
//!
//! # Reference counting
//!
//! Two halves may map keys to the same usage (a Space on each thumb cluster,
//! say). The aggregate bit for a usage stays set while *any* peer holds a key
//! mapped to it, so each usage carries a count of holders. Each peer
//! also remembers which of its own local indices are down; a replayed press
//! or release of the same index is therefore a no-op instead of skewing the
//! count.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::hid::{HidBitmap, HID_BITMAP_BYTES, NO_EVENT};
use crate::peer::PeerId;
use crate::protocol::messages::Keymap;

struct PeerTable {
    keymap: Keymap,
    /// Local indices currently held by this peer.
    held: HidBitmap,
}

/// Holder count per usage. A holder is one (peer, local index) pair, so the
/// count never exceeds 256 × 256.
type HolderCount = u32;

pub struct HidMapper {
    peers: HashMap<PeerId, PeerTable>,
    holders: [HolderCount; 256],
    bitmap: HidBitmap,
}

impl Default for HidMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl HidMapper {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            holders: [0; 256],
            bitmap: HidBitmap::new(),
        }
    }

    /// Stores or replaces the table for `peer`.
    ///
    /// Keys the peer still holds under its previous table are released first.
    /// Entries past 256 are ignored.
    pub fn insert_map(&mut self, peer: PeerId, local_to_hid: &[u8]) {
        let mut keymap = Keymap::new();
        let take = local_to_hid.len().min(keymap.capacity());
        if take < local_to_hid.len() {
            warn!(peer, len = local_to_hid.len(), "keymap truncated to {take} entries");
        }
        // Cannot fail: `take` is bounded by capacity.
        let _ = keymap.extend_from_slice(&local_to_hid[..take]);

        if let Some(previous) = self.peers.remove(&peer) {
            for index in previous.held.iter() {
                if let Some(&code) = previous.keymap.get(usize::from(index)) {
                    self.release_code(code);
                }
            }
        }
        debug!(peer, keys = keymap.len(), "keymap installed");
        self.peers.insert(
            peer,
            PeerTable {
                keymap,
                held: HidBitmap::new(),
            },
        );
    }

    pub fn does_map_exist(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    /// Applies one key transition from `peer`.
    ///
    /// Returns `true` if the aggregate bitmap changed. Unknown peers,
    /// out-of-range indices and positions mapped to 0x00 leave all state
    /// untouched.
    pub fn map_index_to_hid_bitmap(&mut self, local_index: u8, pressed: bool, peer: PeerId) -> bool {
        let Some(table) = self.peers.get_mut(&peer) else {
            debug!(peer, "no keymap for peer, event ignored");
            return false;
        };
        let Some(&code) = table.keymap.get(usize::from(local_index)) else {
            warn!(peer, local_index, keys = table.keymap.len(), "key index out of range");
            return false;
        };
        if code == NO_EVENT || table.held.is_set(local_index) == pressed {
            return false;
        }
        table.held.assign(local_index, pressed);

        if pressed {
            self.press_code(code)
        } else {
            self.release_code(code)
        }
    }

    /// Applies a whole matrix snapshot from `peer`.
    ///
    /// `raw` is LSB-first, `size` is the number of meaningful bytes. Bits past
    /// the peer's table are ignored. Returns `true` if the aggregate changed.
    pub fn map_bitmap_to_hid_bitmap(&mut self, raw: &[u8], size: usize, peer: PeerId) -> bool {
        let Some(table) = self.peers.get(&peer) else {
            debug!(peer, "no keymap for peer, snapshot ignored");
            return false;
        };
        let bytes = &raw[..size.min(raw.len())];
        let keys = table.keymap.len().min(bytes.len() * 8);

        let mut changed = false;
        for index in 0..keys {
            let pressed = bytes[index / 8] & (1 << (index % 8)) != 0;
            // `keys` never exceeds 256, so the index fits in a u8.
            changed |= self.map_index_to_hid_bitmap(index as u8, pressed, peer);
        }
        changed
    }

    /// Copies the aggregate bitmap into `dest`.
    ///
    /// Returns the number of bytes copied: 32, or 0 if `dest` is too small, in
    /// which case `dest` is left untouched.
    pub fn copy_bitmap(&self, dest: &mut [u8]) -> usize {
        if dest.len() < HID_BITMAP_BYTES {
            return 0;
        }
        dest[..HID_BITMAP_BYTES].copy_from_slice(self.bitmap.as_bytes());
        HID_BITMAP_BYTES
    }

    pub fn bitmap(&self) -> &HidBitmap {
        &self.bitmap
    }

    fn press_code(&mut self, code: u8) -> bool {
        let count = &mut self.holders[usize::from(code)];
        *count += 1;
        if *count == 1 {
            self.bitmap.set(code);
            true
        } else {
            false
        }
    }

    fn release_code(&mut self, code: u8) -> bool {
        let count = &mut self.holders[usize::from(code)];
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if *count == 0 {
            self.bitmap.clear(code);
            true
        } else {
            false
        }
    }
}
