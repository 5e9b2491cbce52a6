//! Types for the key registry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded SHA-256 key derived from an address/chain pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueKey(String);

impl UniqueKey {
    /// Length of a derived key in hex characters
    pub const HEX_LEN: usize = 64;

    /// Wrap an existing key string without validating it
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key has the shape of a derived key (64 lowercase hex chars)
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UniqueKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UniqueKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Address and chain name stored under a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMapping {
    pub address: String,
    pub chain_name: String,
}

impl ChainMapping {
    pub fn new(address: impl Into<String>, chain_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain_name: chain_name.into(),
        }
    }
}

/// A registered mapping paired with its key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub key: UniqueKey,
    pub mapping: ChainMapping,
}

impl Entry {
    pub fn address(&self) -> &str {
        &self.mapping.address
    }

    pub fn chain_name(&self) -> &str {
        &self.mapping.chain_name
    }
}
