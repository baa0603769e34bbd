//! HID usage codes and the local-key → HID translation the master performs.

pub mod hid;
pub mod mapper;

pub use hid::{
    is_modifier, modifier_bit, HidBitmap, HidKeyCode, HID_BITMAP_BYTES, MODIFIER_FIRST,
    MODIFIER_LAST, NO_EVENT,
};
pub use mapper::HidMapper;

/// Most keys a single peripheral can describe in its keymap.
pub const MAX_KEYS: usize = 256;
