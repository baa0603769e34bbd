//! Application layer use cases for the peripheral half.
//!
//! # Sub-modules
//!
//! - **`peripheral_controller`** – Runs the pairing handshake, forwards
//!   local matrix events to the master once paired, and answers config
//!   requests with this half's keymap.

pub mod peripheral_controller;
