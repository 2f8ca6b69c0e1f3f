//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default URL the identity provider sends the browser back to.
pub const DEFAULT_RETURN_URL: &str = "http://localhost:4200/";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// How a refresh response's refresh token is merged into the stored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRotation {
    /// Use the refresh token returned by the refresh endpoint when it is
    /// non-empty, otherwise keep the current one.
    #[default]
    AdoptIssued,
    /// Always keep the current refresh token and only replace the access token.
    KeepExisting,
}

/// Session client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the API that issues tokens and serves the profile.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Login redirect endpoint, relative to the base URL.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Logout redirect endpoint, relative to the base URL.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Cookie-authenticated token issuance endpoint.
    #[serde(default = "default_token_path")]
    pub token_path: String,
    /// Refresh endpoint, called with the refresh token as bearer credential.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Profile endpoint.
    #[serde(default = "default_user_info_path")]
    pub user_info_path: String,
    /// Where login/logout redirects return to.
    #[serde(default = "default_return_url")]
    pub return_url: String,
    /// Optional username hint passed to the login endpoint.
    #[serde(default)]
    pub login_hint: Option<String>,
    /// Refresh token rotation policy.
    #[serde(default)]
    pub token_rotation: TokenRotation,
    /// Per-request transport timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_login_path() -> String {
    "/form/login".to_string()
}

fn default_logout_path() -> String {
    "/form/logout".to_string()
}

fn default_token_path() -> String {
    "/form/token".to_string()
}

fn default_refresh_path() -> String {
    "/user/token".to_string()
}

fn default_user_info_path() -> String {
    "/user/info".to_string()
}

fn default_return_url() -> String {
    DEFAULT_RETURN_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            token_path: default_token_path(),
            refresh_path: default_refresh_path(),
            user_info_path: default_user_info_path(),
            return_url: default_return_url(),
            login_hint: None,
            token_rotation: TokenRotation::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "Loading config file");
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `HEIMDALL_*` overrides read through `lookup`. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = lookup("HEIMDALL_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("HEIMDALL_API_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("HEIMDALL_RETURN_URL") {
            self.return_url = url;
        }
    }

    /// Check that every configured URL parses.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        Url::parse(&self.return_url)?;
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The API base URL, parsed.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Resolve an endpoint path against the API base URL.
    pub fn endpoint(&self, path: &str) -> CoreResult<Url> {
        Ok(self.api_base_url()?.join(path)?)
    }

    /// Absolute token issuance URL.
    pub fn token_url(&self) -> CoreResult<Url> {
        self.endpoint(&self.token_path)
    }

    /// Absolute refresh URL.
    pub fn refresh_url(&self) -> CoreResult<Url> {
        self.endpoint(&self.refresh_path)
    }

    /// Absolute profile URL.
    pub fn user_info_url(&self) -> CoreResult<Url> {
        self.endpoint(&self.user_info_path)
    }

    /// Login redirect target, carrying the optional username hint and the return URL.
    pub fn login_url(&self) -> CoreResult<Url> {
        let mut url = self.endpoint(&self.login_path)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(hint) = self.login_hint.as_deref().filter(|h| !h.is_empty()) {
                query.append_pair("username", hint);
            }
            query.append_pair("redirect", &self.return_url);
        }
        Ok(url)
    }

    /// Logout redirect target, carrying the return URL.
    pub fn logout_url(&self) -> CoreResult<Url> {
        let mut url = self.endpoint(&self.logout_path)?;
        url.query_pairs_mut()
            .append_pair("redirect", &self.return_url);
        Ok(url)
    }

    /// Transport timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.token_rotation, TokenRotation::AdoptIssued);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "token_rotation": "keep_existing"
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.token_rotation, TokenRotation::KeepExisting);
        assert_eq!(config.refresh_path, "/user/token");
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.api_base_url = "https://auth.example.com".to_string();
        config.login_hint = Some("oscar".to_string());
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.api_base_url, "https://auth.example.com");
        assert_eq!(loaded.login_hint.as_deref(), Some("oscar"));
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.user_info_path, "/user/info");
        assert_eq!(config.token_rotation, TokenRotation::AdoptIssued);
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let env: HashMap<&str, &str> = [
            ("HEIMDALL_LOG_LEVEL", "trace"),
            ("HEIMDALL_API_URL", "https://api.example.com/"),
            ("HEIMDALL_RETURN_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.return_url, DEFAULT_RETURN_URL);
    }

    #[test]
    fn test_endpoint_urls() {
        let config = Config::default();
        assert_eq!(
            config.refresh_url().unwrap().as_str(),
            "http://localhost:8080/user/token"
        );
        assert_eq!(
            config.token_url().unwrap().as_str(),
            "http://localhost:8080/form/token"
        );
    }

    #[test]
    fn test_login_url_carries_hint_and_return_url() {
        let mut config = Config::default();
        config.login_hint = Some("oscar".to_string());

        let url = config.login_url().unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("username".to_string(), "oscar".to_string()),
                ("redirect".to_string(), DEFAULT_RETURN_URL.to_string()),
            ]
        );
    }

    #[test]
    fn test_logout_url_has_no_hint() {
        let mut config = Config::default();
        config.login_hint = Some("oscar".to_string());

        let url = config.logout_url().unwrap();
        assert_eq!(url.path(), "/form/logout");
        assert!(url.query_pairs().all(|(k, _)| k != "username"));
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.api_base_url = "not a valid url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.request_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }
}
