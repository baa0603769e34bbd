//! Infrastructure layer for the peripheral application.
//!
//! - `matrix` turns text commands into key events, standing in for the
//!   matrix scanner.
//! - `storage` loads the TOML configuration, including the keymap.

pub mod matrix;
pub mod storage;
