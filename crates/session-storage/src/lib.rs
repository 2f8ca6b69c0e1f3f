//! Session persistence for heimdall.
//!
//! This crate provides:
//! - The persisted data model: [`Token`], [`UserInfo`], [`SessionSnapshot`]
//! - Key/value [`SecureStorage`] backends (in-memory and JSON file)
//! - [`SessionVault`], the whole-session [`SessionPersistence`] collaborator

mod file;
mod keys;
mod memory;
mod model;
mod traits;
mod vault;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use model::{SessionSnapshot, Token, UserInfo};
pub use traits::{SecureStorage, SessionPersistence};
pub use vault::SessionVault;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a [`SessionVault`] backed by a JSON file at `path`.
pub fn create_file_vault(path: impl AsRef<Path>) -> StorageResult<SessionVault> {
    let storage = FileStorage::open(path.as_ref())?;
    Ok(SessionVault::new(Box::new(storage)))
}

/// Create a [`SessionVault`] that only lives in memory.
pub fn create_memory_vault() -> SessionVault {
    SessionVault::new(Box::new(MemoryStorage::new()))
}
