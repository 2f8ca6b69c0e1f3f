//! Storage trait definitions.

use crate::{SessionSnapshot, StorageResult};

/// Trait for key/value storage backends
pub trait SecureStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Whole-session persistence collaborator.
///
/// Last writer wins; a `load` never observes a partially written snapshot.
pub trait SessionPersistence: Send + Sync {
    /// Load the stored snapshot, if any.
    fn load(&self) -> StorageResult<Option<SessionSnapshot>>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &SessionSnapshot) -> StorageResult<()>;

    /// Remove the stored snapshot.
    fn clear(&self) -> StorageResult<()> {
        self.save(&SessionSnapshot::default())
    }
}
