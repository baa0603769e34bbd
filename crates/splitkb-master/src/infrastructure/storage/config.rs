//! TOML-based configuration for the master half.
//!
//! The file is read from the path given on the command line, or else from the
//! platform-appropriate config directory:
//! - Linux:    `~/.config/splitkb/master.toml`
//! - macOS:    `~/Library/Application Support/splitkb/master.toml`
//! - Windows:  `%APPDATA%\splitkb\master.toml`
//!
//! ```toml
//! [master]
//! address = "02:00:00:00:00:01"
//! log_level = "info"
//! registry_path = "/var/lib/splitkb/peers.bin"
//!
//! [inbox]
//! capacity = 32
//! enqueue_timeout_ms = 5
//!
//! [link]
//! bind = "0.0.0.0:47100"
//! medium = ["255.255.255.255:47100"]
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so the binary runs on first start
//! before any file exists.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use splitkb_core::config::{default_config_path, read_toml, write_toml};
use splitkb_core::inbox::{InboxSettings, MAX_CAPACITY, MIN_CAPACITY};
use splitkb_core::peer::{PeerAddress, DEFAULT_RETRY_INTERVAL};
use splitkb_core::transport::UdpLinkConfig;

pub use splitkb_core::config::ConfigError;

use crate::application::master_controller::MasterSettings;

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level master configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MasterAppConfig {
    #[serde(default)]
    pub master: MasterSection,
    #[serde(default)]
    pub inbox: InboxSettings,
    #[serde(default)]
    pub link: UdpLinkConfig,
}

/// General master behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterSection {
    /// This node's link address.
    #[serde(default = "default_address")]
    pub address: PeerAddress,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Inbox wait in milliseconds before the loop wakes idle.
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
    /// Where the peer registry is saved on shutdown. Not persisted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_address() -> PeerAddress {
    PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01])
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_idle_tick_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

impl Default for MasterSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            log_level: default_log_level(),
            idle_tick_ms: default_idle_tick_ms(),
            registry_path: None,
        }
    }
}

impl MasterAppConfig {
    /// Checks ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.inbox.is_valid_capacity() {
            return Err(ConfigError::Invalid(format!(
                "inbox.capacity must be {MIN_CAPACITY}..={MAX_CAPACITY}, got {}",
                self.inbox.capacity
            )));
        }
        if self.master.address.is_zero() || self.master.address.is_broadcast() {
            return Err(ConfigError::Invalid(format!(
                "master.address {} is reserved",
                self.master.address
            )));
        }
        if self.master.idle_tick_ms == 0 {
            return Err(ConfigError::Invalid("master.idle_tick_ms must be non-zero".into()));
        }
        if self.link.medium.is_empty() {
            return Err(ConfigError::Invalid("link.medium must list at least one address".into()));
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> MasterSettings {
        MasterSettings {
            inbox: self.inbox,
            idle_tick: Duration::from_millis(self.master.idle_tick_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    default_config_path("master.toml")
}

/// Loads and validates the config at `path` (or the default path), returning
/// defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed, and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(path: Option<&Path>) -> Result<MasterAppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    let config = read_toml::<MasterAppConfig>(&path)?.unwrap_or_default();
    config.validate()?;
    Ok(config)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &MasterAppConfig, path: &Path) -> Result<(), ConfigError> {
    write_toml(config, path)
}

/// Writes the default config to `path` unless a file is already there.
///
/// Returns `true` if a file was written.
pub fn write_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&MasterAppConfig::default(), path)?;
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
