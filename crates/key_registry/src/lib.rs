//! Key registry for address/chain mappings
//!
//! Derives a stable identifier from a wallet address and a chain name and keeps
//! the `key -> (address, chainName)` mapping in memory for later lookup. The
//! registry is an owned value; callers share it behind an `Arc`.

pub mod errors;
pub mod registry;
pub mod types;

pub use errors::*;
pub use registry::{derive_key, KeyRegistry, KEY_SEPARATOR};
pub use types::*;
