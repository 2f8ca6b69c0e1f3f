//! Token-issuance and profile collaborators.

use crate::client::AuthenticatedClient;
use crate::transport::{HttpRequest, Transport};
use crate::AuthResult;
use async_trait::async_trait;
use auth_config_and_utils::Config;
use session_storage::{Token, UserInfo};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Issues and refreshes tokens.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// Exchange the server-side (cookie) session for a token.
    async fn issue_token(&self) -> AuthResult<Token>;

    /// Trade a refresh token for a new token.
    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<Token>;
}

/// Loads the signed-in user's profile through the authenticated client.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn get_user_info(&self, client: &AuthenticatedClient) -> AuthResult<UserInfo>;
}

/// [`TokenService`] over HTTP.
///
/// Talks to the raw transport rather than the authenticated client so that a
/// 401 from the refresh endpoint can never trigger another refresh.
pub struct HttpTokenService {
    transport: Arc<dyn Transport>,
    token_url: Url,
    refresh_url: Url,
}

impl HttpTokenService {
    pub fn new(transport: Arc<dyn Transport>, token_url: Url, refresh_url: Url) -> Self {
        Self {
            transport,
            token_url,
            refresh_url,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> AuthResult<Self> {
        Ok(Self::new(transport, config.token_url()?, config.refresh_url()?))
    }
}

#[async_trait]
impl TokenService for HttpTokenService {
    async fn issue_token(&self) -> AuthResult<Token> {
        debug!(url = %self.token_url, "Requesting token");
        let response = self
            .transport
            .send(HttpRequest::get(self.token_url.clone()))
            .await?
            .error_for_status("token endpoint")?;
        response.json()
    }

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<Token> {
        debug!(url = %self.refresh_url, "Refreshing token");
        let mut request = HttpRequest::get(self.refresh_url.clone());
        request.set_bearer(refresh_token);
        let response = self
            .transport
            .send(request)
            .await?
            .error_for_status("refresh endpoint")?;
        response.json()
    }
}

/// [`ProfileService`] over HTTP.
pub struct HttpProfileService {
    user_info_url: Url,
}

impl HttpProfileService {
    pub fn new(user_info_url: Url) -> Self {
        Self { user_info_url }
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        Ok(Self::new(config.user_info_url()?))
    }
}

#[async_trait]
impl ProfileService for HttpProfileService {
    async fn get_user_info(&self, client: &AuthenticatedClient) -> AuthResult<UserInfo> {
        let response = client
            .send(HttpRequest::get(self.user_info_url.clone()))
            .await?
            .error_for_status("profile endpoint")?;
        response.json()
    }
}
