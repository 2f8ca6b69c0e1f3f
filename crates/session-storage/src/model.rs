//! Persisted session data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Access/refresh token pair.
///
/// An empty field means "absent". Tokens are replaced wholesale, never
/// mutated in place.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl Token {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// A token carrying only an access credential, as handed over by a URL override.
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self::new(access_token, String::new())
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &Redacted(&self.access_token))
            .field("refresh_token", &Redacted(&self.refresh_token))
            .finish()
    }
}

struct Redacted<'a>(&'a str);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<empty>")
        } else {
            write!(f, "<redacted:{}>", self.0.len())
        }
    }
}

/// Profile of the signed-in user. An empty username means "not loaded yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.username.is_empty()
    }
}

/// The persisted, restorable unit of session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub token: Token,
    #[serde(default)]
    pub user_info: UserInfo,
}

impl SessionSnapshot {
    pub fn new(token: Token, user_info: UserInfo) -> Self {
        Self { token, user_info }
    }

    /// True when nothing worth restoring is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
