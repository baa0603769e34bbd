//! TOML-based configuration for a peripheral half.
//!
//! The file is read from the path given on the command line, or else from the
//! platform config directory (`peripheral.toml` next to the master's file).
//!
//! ```toml
//! [peripheral]
//! address = "02:00:00:00:00:10"
//! log_level = "info"
//! pairing_interval_ms = 2500
//!
//! [matrix]
//! rows = 1
//! cols = 4
//! keymap = [0x04, 0x05, 0x06, 0xE1]
//!
//! [inbox]
//! capacity = 32
//!
//! [link]
//! bind = "0.0.0.0:47100"
//! ```
//!
//! The keymap lists one HID usage per matrix cell in row-major order; `0`
//! leaves a cell unmapped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use splitkb_core::config::{default_config_path, read_toml, write_toml};
use splitkb_core::inbox::{InboxSettings, MAX_CAPACITY, MIN_CAPACITY};
use splitkb_core::keymap::HidKeyCode;
use splitkb_core::peer::{PeerAddress, DEFAULT_RETRY_INTERVAL, MAX_RETRY_INTERVAL, MIN_RETRY_INTERVAL};
use splitkb_core::protocol::DeviceConfig;
use splitkb_core::transport::UdpLinkConfig;

pub use splitkb_core::config::ConfigError;

use crate::application::peripheral_controller::PeripheralSettings;

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PeripheralAppConfig {
    #[serde(default)]
    pub peripheral: PeripheralSection,
    #[serde(default)]
    pub matrix: MatrixSection,
    #[serde(default)]
    pub inbox: InboxSettings,
    #[serde(default)]
    pub link: UdpLinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeripheralSection {
    #[serde(default = "default_address")]
    pub address: PeerAddress,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Milliseconds between pairing request broadcasts, 1500..=3500.
    #[serde(default = "default_pairing_interval_ms")]
    pub pairing_interval_ms: u64,
}

/// Matrix geometry and keymap of this half.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatrixSection {
    #[serde(default = "default_rows")]
    pub rows: u8,
    #[serde(default = "default_cols")]
    pub cols: u8,
    #[serde(default = "default_keymap")]
    pub keymap: Vec<u8>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_address() -> PeerAddress {
    PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x10])
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_pairing_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}
fn default_rows() -> u8 {
    3
}
fn default_cols() -> u8 {
    6
}

/// Left half of a QWERTY block.
fn default_keymap() -> Vec<u8> {
    use HidKeyCode::*;
    [
        Tab, KeyQ, KeyW, KeyE, KeyR, KeyT,
        ControlLeft, KeyA, KeyS, KeyD, KeyF, KeyG,
        ShiftLeft, KeyZ, KeyX, KeyC, KeyV, KeyB,
    ]
    .iter()
    .map(|code| code.usage())
    .collect()
}

impl Default for PeripheralSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            log_level: default_log_level(),
            pairing_interval_ms: default_pairing_interval_ms(),
        }
    }
}

impl Default for MatrixSection {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            keymap: default_keymap(),
        }
    }
}

impl PeripheralAppConfig {
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
        if self.peripheral.address.is_zero() || self.peripheral.address.is_broadcast() {
            return Err(ConfigError::Invalid(format!(
                "peripheral.address {} is reserved",
                self.peripheral.address
            )));
        }
        let interval = Duration::from_millis(self.peripheral.pairing_interval_ms);
        if !(MIN_RETRY_INTERVAL..=MAX_RETRY_INTERVAL).contains(&interval) {
            return Err(ConfigError::Invalid(format!(
                "peripheral.pairing_interval_ms must be {}..={}, got {}",
                MIN_RETRY_INTERVAL.as_millis(),
                MAX_RETRY_INTERVAL.as_millis(),
                self.peripheral.pairing_interval_ms
            )));
        }
        if self.link.medium.is_empty() {
            return Err(ConfigError::Invalid("link.medium must list at least one address".into()));
        }
        self.device_config().map(|_| ())
    }

    /// Builds the config blob content announced to the master.
    pub fn device_config(&self) -> Result<DeviceConfig, ConfigError> {
        DeviceConfig::new(self.matrix.rows, self.matrix.cols, &self.matrix.keymap)
            .map_err(|e| ConfigError::Invalid(format!("matrix: {e}")))
    }

    pub fn controller_settings(&self) -> PeripheralSettings {
        PeripheralSettings {
            inbox: self.inbox,
            pairing_interval: Duration::from_millis(self.peripheral.pairing_interval_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    default_config_path("peripheral.toml")
}

/// Loads and validates the config at `path` (or the default path), returning
/// defaults if the file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<PeripheralAppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    let config = read_toml::<PeripheralAppConfig>(&path)?.unwrap_or_default();
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &PeripheralAppConfig, path: &Path) -> Result<(), ConfigError> {
    write_toml(config, path)
}

/// Writes the default config to `path` unless a file is already there.
/// Returns `true` if a file was written.
pub fn write_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&PeripheralAppConfig::default(), path)?;
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
