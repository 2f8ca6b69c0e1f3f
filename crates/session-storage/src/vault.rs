//! Whole-session persistence over a key/value backend.

use crate::{SecureStorage, SessionPersistence, SessionSnapshot, StorageKeys, StorageResult};
use tracing::debug;

/// Stores the [`SessionSnapshot`] as one JSON value, so a save is a single
/// backend write and never exposes a half-updated session.
pub struct SessionVault {
    storage: Box<dyn SecureStorage>,
}

impl SessionVault {
    /// Create a new vault with the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Whether a snapshot is currently stored.
    pub fn has_session(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::SESSION_SNAPSHOT)
    }
}

impl SessionPersistence for SessionVault {
    fn load(&self) -> StorageResult<Option<SessionSnapshot>> {
        match self.storage.get(StorageKeys::SESSION_SNAPSHOT)? {
            Some(json) => {
                let snapshot: SessionSnapshot = serde_json::from_str(&json)?;
                debug!(
                    has_access_token = snapshot.token.has_access_token(),
                    has_user = snapshot.user_info.is_loaded(),
                    "Loaded session snapshot"
                );
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &SessionSnapshot) -> StorageResult<()> {
        let json = serde_json::to_string(snapshot)?;
        self.storage.set(StorageKeys::SESSION_SNAPSHOT, &json)
    }

    fn clear(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::SESSION_SNAPSHOT)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_file_vault, MemoryStorage, StorageError, Token, UserInfo};
    use tempfile::tempdir;

    fn sample() -> SessionSnapshot {
        SessionSnapshot::new(Token::new("abc", "r1"), UserInfo::new("oscar"))
    }

    #[test]
    fn test_save_then_load_returns_equal_snapshot() {
        let vault = SessionVault::new(Box::new(MemoryStorage::new()));
        assert_eq!(vault.load().unwrap(), None);

        vault.save(&sample()).unwrap();
        assert_eq!(vault.load().unwrap(), Some(sample()));
    }

    #[test]
    fn test_file_vault_roundtrip_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        create_file_vault(&path).unwrap().save(&sample()).unwrap();

        let reopened = create_file_vault(&path).unwrap();
        assert!(reopened.has_session().unwrap());
        assert_eq!(reopened.load().unwrap(), Some(sample()));
    }

    #[test]
    fn test_last_writer_wins() {
        let vault = SessionVault::new(Box::new(MemoryStorage::new()));
        vault.save(&sample()).unwrap();

        let replacement = SessionSnapshot::new(Token::access_only("xyz"), UserInfo::default());
        vault.save(&replacement).unwrap();

        assert_eq!(vault.load().unwrap(), Some(replacement));
    }

    #[test]
    fn test_clear_removes_snapshot() {
        let vault = SessionVault::new(Box::new(MemoryStorage::new()));
        vault.save(&sample()).unwrap();
        vault.clear().unwrap();

        assert!(!vault.has_session().unwrap());
        assert_eq!(vault.load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_encoding_error() {
        let storage = MemoryStorage::new();
        storage
            .set(StorageKeys::SESSION_SNAPSHOT, "{\"token\": 42}")
            .unwrap();
        let vault = SessionVault::new(Box::new(storage));

        assert!(matches!(vault.load(), Err(StorageError::Encoding(_))));
    }
}
