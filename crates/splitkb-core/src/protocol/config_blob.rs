//! Packing of a peripheral's configuration into length-prefixed blocks.
//!
//! ```text
//! [len:u32 LE][len bytes]   block 0: matrix geometry [rows][cols]
//! [len:u32 LE][len bytes]   block 1: local-index → HID usage keymap
//! ```
//!
//! Unpacking validates each declared length against the bytes that remain
//! before slicing, so a corrupt blob fails with an error instead of reading
//! past the buffer or silently truncating the keymap.

use thiserror::Error;

use super::messages::{DeviceConfig, Keymap, Payload};

/// Size of each block's length prefix.
pub const LEN_PREFIX: usize = 4;

/// Most blocks a blob may carry.
pub const MAX_BLOCKS: usize = 4;

const GEOMETRY_BLOCK: usize = 0;
const KEYMAP_BLOCK: usize = 1;
const DEVICE_CONFIG_BLOCKS: usize = 2;

/// Errors raised while packing or unpacking a config blob.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigBlobError {
    #[error("block {index} declares {declared} bytes but only {remaining} remain")]
    SizeMismatch {
        index: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("block {index} length prefix truncated: {remaining} bytes remain")]
    TruncatedPrefix { index: usize, remaining: usize },

    #[error("expected {expected} config blocks, found {found}")]
    BlockCount { expected: usize, found: usize },

    #[error("geometry block must be 2 bytes, got {0}")]
    BadGeometry(usize),

    #[error("keymap holds {actual} entries but a {rows}x{cols} matrix needs {expected}")]
    KeymapSizeMismatch {
        rows: u8,
        cols: u8,
        expected: usize,
        actual: usize,
    },

    #[error("config needs {needed} bytes, buffer capacity is {capacity}")]
    Overflow { needed: usize, capacity: usize },
}

/// Appends `blocks` to `out`, each behind a little-endian `u32` length.
///
/// The total size is checked before anything is written, so `out` is left
/// untouched on error.
pub fn pack_blocks<const N: usize>(
    blocks: &[&[u8]],
    out: &mut heapless::Vec<u8, N>,
) -> Result<(), ConfigBlobError> {
    let needed: usize = blocks.iter().map(|b| LEN_PREFIX + b.len()).sum();
    let capacity = N - out.len();
    if needed > capacity {
        return Err(ConfigBlobError::Overflow { needed, capacity });
    }
    for block in blocks {
        let len = (block.len() as u32).to_le_bytes();
        // Space was reserved above.
        let _ = out.extend_from_slice(&len);
        let _ = out.extend_from_slice(block);
    }
    Ok(())
}

/// Splits a blob back into the blocks it was packed from.
pub fn unpack_blocks(bytes: &[u8]) -> Result<heapless::Vec<&[u8], MAX_BLOCKS>, ConfigBlobError> {
    let mut blocks = heapless::Vec::new();
    let mut rest = bytes;
    let mut index = 0;

    while !rest.is_empty() {
        if rest.len() < LEN_PREFIX {
            return Err(ConfigBlobError::TruncatedPrefix {
                index,
                remaining: rest.len(),
            });
        }
        let (prefix, body) = rest.split_at(LEN_PREFIX);
        let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if declared > body.len() {
            return Err(ConfigBlobError::SizeMismatch {
                index,
                declared,
                remaining: body.len(),
            });
        }
        let (block, tail) = body.split_at(declared);
        if blocks.push(block).is_err() {
            return Err(ConfigBlobError::BlockCount {
                expected: MAX_BLOCKS,
                found: index + 1,
            });
        }
        rest = tail;
        index += 1;
    }
    Ok(blocks)
}

impl DeviceConfig {
    /// Builds a config, checking that the keymap covers exactly `rows × cols` keys.
    pub fn new(rows: u8, cols: u8, keymap: &[u8]) -> Result<Self, ConfigBlobError> {
        let keymap = Keymap::from_slice(keymap).map_err(|_| ConfigBlobError::Overflow {
            needed: keymap.len(),
            capacity: Keymap::new().capacity(),
        })?;
        let config = Self { rows, cols, keymap };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the keymap length matches the matrix geometry.
    pub fn validate(&self) -> Result<(), ConfigBlobError> {
        let expected = self.key_count();
        if self.keymap.len() != expected {
            return Err(ConfigBlobError::KeymapSizeMismatch {
                rows: self.rows,
                cols: self.cols,
                expected,
                actual: self.keymap.len(),
            });
        }
        Ok(())
    }

    /// Serialises the config into a blob suitable for a `Config` packet.
    pub fn to_blob(&self) -> Result<Payload, ConfigBlobError> {
        self.validate()?;
        let mut out = Payload::new();
        pack_blocks(&[&[self.rows, self.cols], &self.keymap], &mut out)?;
        Ok(out)
    }

    /// Parses a blob produced by [`DeviceConfig::to_blob`].
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigBlobError> {
        let blocks = unpack_blocks(bytes)?;
        if blocks.len() != DEVICE_CONFIG_BLOCKS {
            return Err(ConfigBlobError::BlockCount {
                expected: DEVICE_CONFIG_BLOCKS,
                found: blocks.len(),
            });
        }
        let geometry = blocks[GEOMETRY_BLOCK];
        let [rows, cols] = geometry else {
            return Err(ConfigBlobError::BadGeometry(geometry.len()));
        };
        Self::new(*rows, *cols, blocks[KEYMAP_BLOCK])
    }
}
