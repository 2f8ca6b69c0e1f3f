//! Login/logout redirect collaborator.

use crate::AuthResult;
use auth_config_and_utils::Config;
use parking_lot::Mutex;
use tracing::info;
use url::Url;

/// Performs a full navigation to the identity provider. Nothing is awaited
/// in-process.
pub trait Redirector: Send + Sync {
    fn login(&self);
    fn logout(&self);
}

/// Navigation callback handed the absolute redirect target.
pub type Navigator = Box<dyn Fn(&Url) + Send + Sync>;

/// [`Redirector`] that builds the configured login/logout URLs and hands them
/// to a navigator. The default navigator only logs the target.
pub struct UrlRedirector {
    login_url: Url,
    logout_url: Url,
    navigate: Navigator,
}

impl UrlRedirector {
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        Ok(Self {
            login_url: config.login_url()?,
            logout_url: config.logout_url()?,
            navigate: Box::new(|url| info!(url = %url, "Redirecting")),
        })
    }

    pub fn with_navigator(mut self, navigate: Navigator) -> Self {
        self.navigate = navigate;
        self
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    pub fn logout_url(&self) -> &Url {
        &self.logout_url
    }
}

impl Redirector for UrlRedirector {
    fn login(&self) {
        (self.navigate)(&self.login_url);
    }

    fn logout(&self) {
        (self.navigate)(&self.logout_url);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Login,
    Logout,
}

/// [`Redirector`] that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingRedirector {
    redirects: Mutex<Vec<RedirectKind>>,
}

impl RecordingRedirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<RedirectKind> {
        self.redirects.lock().clone()
    }

    pub fn logins(&self) -> usize {
        self.count(RedirectKind::Login)
    }

    pub fn logouts(&self) -> usize {
        self.count(RedirectKind::Logout)
    }

    fn count(&self, kind: RedirectKind) -> usize {
        self.redirects.lock().iter().filter(|k| **k == kind).count()
    }
}

impl Redirector for RecordingRedirector {
    fn login(&self) {
        self.redirects.lock().push(RedirectKind::Login);
    }

    fn logout(&self) {
        self.redirects.lock().push(RedirectKind::Logout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_url_redirector_navigates_to_config_targets() {
        let config = Config {
            login_hint: Some("oscar".to_string()),
            ..Config::default()
        };
        let visited = Arc::new(Mutex::new(Vec::new()));
        let sink = visited.clone();
        let redirector = UrlRedirector::from_config(&config)
            .unwrap()
            .with_navigator(Box::new(move |url| sink.lock().push(url.to_string())));

        redirector.login();
        redirector.logout();

        let visited = visited.lock();
        assert_eq!(
            visited[0],
            "http://localhost:8080/form/login?username=oscar&redirect=http%3A%2F%2Flocalhost%3A4200%2F"
        );
        assert_eq!(
            visited[1],
            "http://localhost:8080/form/logout?redirect=http%3A%2F%2Flocalhost%3A4200%2F"
        );
    }

    #[test]
    fn test_recording_redirector_counts() {
        let redirector = RecordingRedirector::new();
        redirector.login();
        redirector.logout();
        redirector.login();

        assert_eq!(redirector.logins(), 2);
        assert_eq!(redirector.logouts(), 1);
        assert_eq!(
            redirector.redirects(),
            vec![RedirectKind::Login, RedirectKind::Logout, RedirectKind::Login]
        );
    }
}
