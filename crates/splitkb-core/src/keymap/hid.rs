//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page) and the 256-bit
//! bitmap the master keeps of every usage currently held.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The USB HID standard gives every key a number on page 0x07. Letters start
//! at 0x04 (not at ASCII 'A' = 0x41) because the numbers describe physical key
//! positions, not characters; the host's layout decides what a key types.
//!
//! | Key          | HID Usage ID |
//! |--------------|-------------|
//! | Letter A     | 0x04        |
//! | Enter        | 0x28        |
//! | Left Ctrl    | 0xE0        |
//!
//! Usage 0x00 means "no event". A keymap entry of 0x00 marks a matrix
//! position that produces nothing.

use std::fmt;

/// First modifier usage (Left Ctrl).
pub const MODIFIER_FIRST: u8 = 0xE0;
/// Last modifier usage (Right GUI).
pub const MODIFIER_LAST: u8 = 0xE7;
/// Usage 0x00, "no event".
pub const NO_EVENT: u8 = 0x00;

/// Returns `true` for the eight modifier usages `0xE0..=0xE7`.
pub const fn is_modifier(code: u8) -> bool {
    code >= MODIFIER_FIRST && code <= MODIFIER_LAST
}

/// Bit of the report modifier byte that `code` controls, if it is a modifier.
pub const fn modifier_bit(code: u8) -> Option<u8> {
    if is_modifier(code) {
        Some(1 << (code - MODIFIER_FIRST))
    } else {
        None
    }
}

/// Named HID usages for the keys a split board commonly carries.
///
/// Keymaps on the wire are raw `u8` usages; this enum exists for building
/// default keymaps and for readable log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HidKeyCode {
    // Letters (HID 0x04–0x1D)
    KeyA = 0x04,
    KeyB = 0x05,
    KeyC = 0x06,
    KeyD = 0x07,
    KeyE = 0x08,
    KeyF = 0x09,
    KeyG = 0x0A,
    KeyH = 0x0B,
    KeyI = 0x0C,
    KeyJ = 0x0D,
    KeyK = 0x0E,
    KeyL = 0x0F,
    KeyM = 0x10,
    KeyN = 0x11,
    KeyO = 0x12,
    KeyP = 0x13,
    KeyQ = 0x14,
    KeyR = 0x15,
    KeyS = 0x16,
    KeyT = 0x17,
    KeyU = 0x18,
    KeyV = 0x19,
    KeyW = 0x1A,
    KeyX = 0x1B,
    KeyY = 0x1C,
    KeyZ = 0x1D,

    // Digits (HID 0x1E–0x27)
    Digit1 = 0x1E,
    Digit2 = 0x1F,
    Digit3 = 0x20,
    Digit4 = 0x21,
    Digit5 = 0x22,
    Digit6 = 0x23,
    Digit7 = 0x24,
    Digit8 = 0x25,
    Digit9 = 0x26,
    Digit0 = 0x27,

    // Control and punctuation (HID 0x28–0x39)
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    BracketLeft = 0x2F,
    BracketRight = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    Backquote = 0x35,
    Comma = 0x36,
    Period = 0x37,
    Slash = 0x38,
    CapsLock = 0x39,

    // Function keys (HID 0x3A–0x45)
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation cluster (HID 0x49–0x52)
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,

    // Modifier keys (HID 0xE0–0xE7)
    ControlLeft = 0xE0,
    ShiftLeft = 0xE1,
    AltLeft = 0xE2,
    MetaLeft = 0xE3,
    ControlRight = 0xE4,
    ShiftRight = 0xE5,
    AltRight = 0xE6,
    MetaRight = 0xE7,
}

impl HidKeyCode {
    /// Every named usage, in ascending order.
    pub const ALL: [HidKeyCode; 83] = {
        use HidKeyCode::*;
        [
            KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
            KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
            Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9, Digit0,
            Enter, Escape, Backspace, Tab, Space, Minus, Equal, BracketLeft, BracketRight,
            Backslash, Semicolon, Quote, Backquote, Comma, Period, Slash, CapsLock,
            F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
            Insert, Home, PageUp, Delete, End, PageDown, ArrowRight, ArrowLeft, ArrowDown,
            ArrowUp,
            ControlLeft, ShiftLeft, AltLeft, MetaLeft, ControlRight, ShiftRight, AltRight,
            MetaRight,
        ]
    };

    /// Looks up the named key for a raw usage. `None` for 0x00 and unnamed usages.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| *code as u8 == value)
    }

    pub const fn usage(self) -> u8 {
        self as u8
    }

    pub const fn is_modifier(self) -> bool {
        is_modifier(self as u8)
    }
}

impl fmt::Display for HidKeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Bitmap ────────────────────────────────────────────────────────────────────

/// Size of a [`HidBitmap`] in bytes.
pub const HID_BITMAP_BYTES: usize = 32;

/// One bit per value of a `u8`, LSB-first within each byte.
///
/// The master uses it for the aggregate set of held HID usages; the mapper
/// also reuses it to track which local key indices a peer holds.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct HidBitmap([u8; HID_BITMAP_BYTES]);

impl HidBitmap {
    pub const fn new() -> Self {
        Self([0; HID_BITMAP_BYTES])
    }

    pub const fn from_bytes(bytes: [u8; HID_BITMAP_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn is_set(&self, bit: u8) -> bool {
        self.0[usize::from(bit / 8)] & (1 << (bit % 8)) != 0
    }

    pub fn set(&mut self, bit: u8) {
        self.0[usize::from(bit / 8)] |= 1 << (bit % 8);
    }

    pub fn clear(&mut self, bit: u8) {
        self.0[usize::from(bit / 8)] &= !(1 << (bit % 8));
    }

    pub fn assign(&mut self, bit: u8, value: bool) {
        if value {
            self.set(bit);
        } else {
            self.clear(bit);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |bit| self.is_set(*bit))
    }

    pub fn as_bytes(&self) -> &[u8; HID_BITMAP_BYTES] {
        &self.0
    }
}

impl fmt::Debug for HidBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(|code| format!("{code:#04x}")))
            .finish()
    }
}
