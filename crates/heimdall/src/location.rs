//! One-shot credential override carried in the page URL.

use crate::AuthResult;
use parking_lot::Mutex;
use tracing::info;
use url::Url;

/// Query parameter that hands an access token to a fresh page load.
pub const ACCESS_TOKEN_PARAM: &str = "accessToken";

/// The current page location.
///
/// [`take_access_token`](Self::take_access_token) strips the override from the
/// URL before returning it, so neither a second call nor a reload of the
/// resulting URL sees it again.
pub struct PageLocation {
    url: Mutex<Url>,
}

impl PageLocation {
    pub fn new(url: Url) -> Self {
        Self {
            url: Mutex::new(url),
        }
    }

    pub fn parse(url: &str) -> AuthResult<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// The location as it currently stands.
    pub fn href(&self) -> String {
        self.url.lock().to_string()
    }

    /// Consume the override, keeping every other query parameter.
    pub fn take_access_token(&self) -> Option<String> {
        let mut url = self.url.lock();
        let token = url
            .query_pairs()
            .find(|(name, _)| name == ACCESS_TOKEN_PARAM)
            .map(|(_, value)| value.into_owned())?;

        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != ACCESS_TOKEN_PARAM)
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        info!(url = %url, "Consumed access token override");

        Some(token).filter(|token| !token.is_empty())
    }
}
