//! Storage key constants.

/// Storage keys used by the session vault
pub struct StorageKeys;

impl StorageKeys {
    /// Whole-session snapshot (JSON)
    pub const SESSION_SNAPSHOT: &'static str = "session_snapshot";
}
