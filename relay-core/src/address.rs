//! 20-byte on-chain identity addresses: relay identity, fleet, registry.

use std::fmt;

use data_encoding::HEXLOWER;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 20-byte address identifying a relay, a fleet, or a registry contract.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    /// `0x50, 0, 0, ...` — default registry address when none is configured.
    pub const REGISTRY_DEFAULT: Address = Address([
        0x50, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]);

    /// `0x60, 0, 0, ...` — default fleet address when none is configured.
    pub const FLEET_DEFAULT: Address = Address([
        0x60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]);

    pub const NULL: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a `0x`-prefixed or bare hex string into an `Address`.
    pub fn from_hex(s: &str) -> Result<Self, AddressParseError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = HEXLOWER
            .decode(trimmed.to_lowercase().as_bytes())
            .map_err(|_| AddressParseError)?;
        let arr: [u8; 20] = bytes.try_into().map_err(|_| AddressParseError)?;
        Ok(Self(arr))
    }

    pub fn hex_string(&self) -> String {
        format!("0x{}", HEXLOWER.encode(&self.0))
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("invalid address: expected 20 hex-encoded bytes")]
pub struct AddressParseError;

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.hex_string())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
