//! Key registry implementation
//!
//! Keys are `hex(sha256(address ":" chainName))`. Inputs are hashed together
//! and never parsed back out, so the separator only has to be fixed.

use crate::errors::*;
use crate::types::*;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Separator placed between the address and the chain name before hashing
pub const KEY_SEPARATOR: char = ':';

/// Compute the deterministic key for an address/chain pair
pub fn derive_key(address: &str, chain_name: &str) -> UniqueKey {
    let mut h = Sha256::new();
    h.update(address.as_bytes());
    h.update([KEY_SEPARATOR as u8]);
    h.update(chain_name.as_bytes());
    UniqueKey::new(hex::encode(h.finalize()))
}

/// In-memory key registry
///
/// Cloning yields another handle onto the same table.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    /// Key → address/chain mapping
    entries: Arc<RwLock<HashMap<UniqueKey, ChainMapping>>>,
}

impl KeyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address/chain pair and return its key
    ///
    /// Re-registering the same pair overwrites the entry with identical values.
    pub fn register(&self, address: &str, chain_name: &str) -> Result<UniqueKey> {
        if address.is_empty() {
            return Err(KeyRegistryError::InvalidArgument { field: "address" });
        }
        if chain_name.is_empty() {
            return Err(KeyRegistryError::InvalidArgument { field: "chainName" });
        }

        let key = derive_key(address, chain_name);
        let previous = {
            let mut entries = self.entries.write();
            entries.insert(key.clone(), ChainMapping::new(address, chain_name))
        };

        if previous.is_some() {
            debug!(key = %key, chain = chain_name, "overwrote existing mapping");
        } else {
            debug!(key = %key, chain = chain_name, "registered new mapping");
        }

        Ok(key)
    }

    /// Fetch the mapping stored under `key`
    pub fn lookup(&self, key: &UniqueKey) -> Result<Entry> {
        let entries = self.entries.read();
        entries
            .get(key)
            .cloned()
            .map(|mapping| Entry {
                key: key.clone(),
                mapping,
            })
            .ok_or_else(|| KeyRegistryError::NotFound {
                key: key.as_str().to_string(),
            })
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            derive_key("alice", "eth").as_str(),
            "f10accd8978771aace49f5721d6ea731f028d31f0682d7f06d37919e2eec993e"
        );
    }

    #[test]
    fn test_key_is_lowercase_hex() {
        let key = derive_key("0xABC", "testnet");
        assert_eq!(key.as_str().len(), UniqueKey::HEX_LEN);
        assert!(key.is_well_formed());
    }

    #[test]
    fn test_register_is_deterministic() {
        let registry = KeyRegistry::new();
        let first = registry.register("alice", "eth").unwrap();
        let second = registry.register("alice", "eth").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, derive_key("alice", "eth"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_inputs_give_distinct_keys() {
        let registry = KeyRegistry::new();
        let a = registry.register("alice", "eth").unwrap();
        let b = registry.register("alice", "polygon").unwrap();
        let c = registry.register("bob", "eth").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let registry = KeyRegistry::new();
        assert_eq!(
            registry.register("", "chain"),
            Err(KeyRegistryError::InvalidArgument { field: "address" })
        );
        assert_eq!(
            registry.register("addr", ""),
            Err(KeyRegistryError::InvalidArgument { field: "chainName" })
        );
        assert!(matches!(
            registry.register("", ""),
            Err(KeyRegistryError::InvalidArgument { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_then_lookup() {
        let registry = KeyRegistry::new();
        let key = registry.register("0xABC", "testnet").unwrap();

        let entry = registry.lookup(&key).unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.address(), "0xABC");
        assert_eq!(entry.chain_name(), "testnet");
    }

    #[test]
    fn test_lookup_not_found() {
        let registry = KeyRegistry::new();
        let err = registry
            .lookup(&UniqueKey::from("nonexistent-key"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err,
            KeyRegistryError::NotFound {
                key: "nonexistent-key".to_string()
            }
        );
    }

    #[test]
    fn test_clones_share_storage() {
        let registry = KeyRegistry::new();
        let handle = registry.clone();
        let key = handle.register("carol", "sol").unwrap();
        assert!(registry.lookup(&key).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let registry = KeyRegistry::new();
        let seeded = registry.register("seed", "testnet").unwrap();
        let mut handles = Vec::new();

        for i in 0..16 {
            let registry = registry.clone();
            let seeded = seeded.clone();
            handles.push(tokio::spawn(async move {
                let mut keys = Vec::new();
                for j in 0..64 {
                    let key = registry
                        .register(&format!("0x{i:02x}{j:038x}"), "testnet")
                        .unwrap();
                    assert_eq!(registry.lookup(&key).unwrap().key, key);
                    assert_eq!(registry.lookup(&seeded).unwrap().address(), "seed");
                    keys.push(key);
                    if j % 8 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                keys
            }));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.extend(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 16 * 64 + 1);
        for key in keys {
            assert_eq!(registry.lookup(&key).unwrap().chain_name(), "testnet");
        }
    }
}
