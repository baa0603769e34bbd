//! Storage infrastructure: configuration file and peer registry persistence.
//!
//! - `config` reads the TOML configuration, falling back to defaults on first
//!   run, and validates ranges.
//! - `peers` saves and restores the peer registry so ids survive restarts.

pub mod config;
pub mod peers;
