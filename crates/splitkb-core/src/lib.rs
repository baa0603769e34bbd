//! # splitkb-core
//!
//! Shared library for a split keyboard made of one **master** half, which
//! speaks USB HID to the host, and one or more **peripheral** halves that
//! talk to the master over an unreliable broadcast link.
//!
//! # Architecture overview (for beginners)
//!
//! A peripheral scans its key matrix and reports *local key indices*
//! (row-major positions) to the master. The master translates those indices
//! through a per-peripheral keymap into USB HID usage codes, merges every
//! half into one bitmap of held usages, and turns that bitmap into the 8-byte
//! report the host understands.
//!
//! - **`peer`** – Node addresses, the address ↔ small-integer id registry,
//!   and the peripheral's pairing state machine.
//!
//! - **`protocol`** – The six packet kinds, their byte layouts, config blobs,
//!   and [`TransportProtocol`], which sends typed packets and turns received
//!   frames into [`Inbound`] values.
//!
//! - **`transport`** – The [`Transport`] trait plus two media: an in-process
//!   bus for tests and a UDP emulation of the radio.
//!
//! - **`keymap`** – HID usage codes and the [`HidMapper`] that maintains the
//!   aggregate bitmap.
//!
//! - **`report`** – The [`SixKroEncoder`] that produces boot keyboard reports.
//!
//! - **`inbox`** – The bounded channel every controller task reads from.
//!
//! - **`config`** – Platform config directory and TOML file access used by
//!   both binaries.

pub mod config;
pub mod inbox;
pub mod keymap;
pub mod peer;
pub mod protocol;
pub mod report;
pub mod transport;

pub use keymap::{HidBitmap, HidKeyCode, HidMapper};
pub use peer::{PeerAddress, PeerId, PeerRegistry, Role, MASTER_ID};
pub use protocol::{Inbound, LinkError, Packet, ProtocolError, TransportProtocol};
pub use report::{SixKroEncoder, SixKroReport};
pub use transport::{Destination, Frame, Transport, TransportError};
