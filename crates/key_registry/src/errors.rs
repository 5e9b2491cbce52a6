//! Error types for the key registry

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyRegistryError {
    #[error("{field} is required")]
    InvalidArgument { field: &'static str },

    #[error("No mapping registered for key: {key}")]
    NotFound { key: String },
}

impl KeyRegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyRegistryError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, KeyRegistryError>;
