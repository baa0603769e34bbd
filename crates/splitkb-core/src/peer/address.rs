//! 6-byte hardware addresses identifying keyboard halves on the link.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of bytes in a [`PeerAddress`].
pub const ADDRESS_LEN: usize = 6;

/// Errors produced when parsing a textual address such as `"02:00:00:00:00:01"`.
#[derive(Debug, Error, PartialEq)]
pub enum AddressParseError {
    #[error("expected {ADDRESS_LEN} colon-separated octets, got {0}")]
    WrongOctetCount(usize),
    #[error("invalid hex octet: {0:?}")]
    InvalidOctet(String),
}

/// A 6-byte link-layer address (MAC style).
///
/// Serialised as the familiar `aa:bb:cc:dd:ee:ff` string so that addresses
/// read naturally in TOML configuration files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress(pub [u8; ADDRESS_LEN]);

impl PeerAddress {
    /// The all-zero address, returned for unknown peer ids.
    pub const ZERO: PeerAddress = PeerAddress([0; ADDRESS_LEN]);

    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: PeerAddress = PeerAddress([0xFF; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Reads an address from the first six bytes of `bytes`.
    ///
    /// Returns `None` when fewer than six bytes are available.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; ADDRESS_LEN] = bytes.get(..ADDRESS_LEN)?.try_into().ok()?;
        Some(Self(octets))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({self})")
    }
}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != ADDRESS_LEN {
            return Err(AddressParseError::WrongOctetCount(parts.len()));
        }
        let mut octets = [0u8; ADDRESS_LEN];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(AddressParseError::InvalidOctet(part.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| AddressParseError::InvalidOctet(part.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(value: PeerAddress) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_lowercase_colon_notation() {
        let addr = PeerAddress::new([0x02, 0xAB, 0x00, 0x10, 0xFE, 0x01]);
        assert_eq!(addr.to_string(), "02:ab:00:10:fe:01");
    }

    #[test]
    fn test_parse_accepts_mixed_case() {
        let addr: PeerAddress = "02:AB:00:10:fe:01".parse().unwrap();
        assert_eq!(addr, PeerAddress::new([0x02, 0xAB, 0x00, 0x10, 0xFE, 0x01]));
    }

    #[test]
    fn test_parse_rejects_short_address() {
        let result = "02:ab:00".parse::<PeerAddress>();
        assert_eq!(result, Err(AddressParseError::WrongOctetCount(3)));
    }

    #[test]
    fn test_parse_rejects_non_hex_octet() {
        let result = "02:ab:00:zz:fe:01".parse::<PeerAddress>();
        assert!(matches!(result, Err(AddressParseError::InvalidOctet(_))));
    }

    #[test]
    fn test_from_slice_requires_six_bytes() {
        assert!(PeerAddress::from_slice(&[1, 2, 3, 4, 5]).is_none());
        assert_eq!(
            PeerAddress::from_slice(&[1, 2, 3, 4, 5, 6, 7]),
            Some(PeerAddress::new([1, 2, 3, 4, 5, 6]))
        );
    }

    #[test]
    fn test_broadcast_and_zero_are_distinct() {
        assert!(PeerAddress::BROADCAST.is_broadcast());
        assert!(PeerAddress::ZERO.is_zero());
        assert_ne!(PeerAddress::BROADCAST, PeerAddress::ZERO);
    }
}
