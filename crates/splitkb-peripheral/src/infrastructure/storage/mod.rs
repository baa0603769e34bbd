//! Storage infrastructure: the peripheral's TOML configuration.

pub mod config;
