//! 6-key-rollover boot keyboard report encoder.
//!
//! # Report layout
//!
//! ```text
//! byte 0      modifier bits (bit n = usage 0xE0 + n)
//! byte 1      reserved, always 0
//! bytes 2..8  up to six non-modifier usages, oldest press first
//! ```
//!
//! The encoder is a streaming diff: it compares each aggregate bitmap with the
//! previous one, so it must see every change in order. Keys pressed while six
//! are already reported wait in the press order and appear as earlier keys are
//! released.

use std::fmt;

use crate::keymap::hid::{modifier_bit, HidBitmap, NO_EVENT};

/// Length of a boot keyboard report.
pub const REPORT_LEN: usize = 8;
/// Non-modifier slots in a report.
pub const KEY_SLOTS: usize = 6;

/// An 8-byte boot-protocol keyboard report.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SixKroReport([u8; REPORT_LEN]);

impl SixKroReport {
    pub const fn from_bytes(bytes: [u8; REPORT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn modifiers(&self) -> u8 {
        self.0[0]
    }

    /// The six key slots, zero padded.
    pub fn keys(&self) -> &[u8] {
        &self.0[2..]
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    /// `true` when nothing is held.
    pub fn is_idle(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for SixKroReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SixKroReport({:02x?})", self.0)
    }
}

/// Turns successive aggregate bitmaps into 6KRO reports.
#[derive(Default)]
pub struct SixKroEncoder {
    last: HidBitmap,
    modifiers: u8,
    pressed_order: heapless::Vec<u8, 256>,
}

impl SixKroEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `current` against the previous bitmap and returns the report.
    pub fn encode(&mut self, current: &HidBitmap) -> SixKroReport {
        for code in 0..=u8::MAX {
            if code == NO_EVENT {
                continue;
            }
            let was = self.last.is_set(code);
            let now = current.is_set(code);
            match (was, now) {
                (false, true) => self.on_press(code),
                (true, false) => self.on_release(code),
                _ => {}
            }
        }
        self.last = *current;
        self.report()
    }

    /// Non-modifier usages currently held, oldest first, including overflow.
    pub fn pressed_order(&self) -> &[u8] {
        &self.pressed_order
    }

    fn on_press(&mut self, code: u8) {
        if let Some(bit) = modifier_bit(code) {
            self.modifiers |= bit;
        } else if !self.pressed_order.contains(&code) {
            // 255 distinct non-zero usages fit in 256 slots.
            let _ = self.pressed_order.push(code);
        }
    }

    fn on_release(&mut self, code: u8) {
        if let Some(bit) = modifier_bit(code) {
            self.modifiers &= !bit;
        } else if let Some(pos) = self.pressed_order.iter().position(|c| *c == code) {
            self.pressed_order.remove(pos);
        }
    }

    fn report(&self) -> SixKroReport {
        let mut bytes = [0u8; REPORT_LEN];
        bytes[0] = self.modifiers;
        for (slot, code) in bytes[2..].iter_mut().zip(self.pressed_order.iter()) {
            *slot = *code;
        }
        SixKroReport(bytes)
    }
}
