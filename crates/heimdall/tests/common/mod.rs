#![allow(dead_code)]

use async_trait::async_trait;
use auth_config_and_utils::{Config, TokenRotation};
use heimdall::{
    AuthError, AuthResult, HttpProfileService, HttpRequest, HttpResponse, PageLocation,
    RecordingRedirector, SessionCollaborators, SessionRuntime, Token, TokenService, Transport,
};
use parking_lot::Mutex;
use session_storage::{create_memory_vault, SessionPersistence, SessionSnapshot, SessionVault};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Barrier, Notify};
use url::Url;

pub fn api_url(path: &str) -> Url {
    Config::default().endpoint(path).unwrap()
}

/// Serves canned bodies for accepted bearer tokens and 401 for everything else.
#[derive(Default)]
pub struct ScriptedTransport {
    accepted: Mutex<Vec<String>>,
    bodies: Mutex<HashMap<String, String>>,
    seen: Mutex<Vec<Option<String>>>,
    /// Every rejected request waits here before its 401 is returned.
    unauthorized_barrier: Option<Arc<Barrier>>,
    /// Every request waits here before being answered.
    hold: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            accepted: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_body(self, path: &str, body: &str) -> Self {
        self.bodies.lock().insert(path.to_string(), body.to_string());
        self
    }

    pub fn with_unauthorized_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.unauthorized_barrier = Some(barrier);
        self
    }

    pub fn with_hold(mut self, hold: Arc<Notify>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn seen(&self) -> Vec<Option<String>> {
        self.seen.lock().clone()
    }

    pub fn requests(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> AuthResult<HttpResponse> {
        let bearer = request.bearer().map(str::to_string);
        self.seen.lock().push(bearer.clone());
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }

        let accepted = bearer.is_some_and(|b| self.accepted.lock().contains(&b));
        if !accepted {
            if let Some(barrier) = &self.unauthorized_barrier {
                barrier.wait().await;
            }
            return Ok(HttpResponse::new(401, ""));
        }

        let body = self
            .bodies
            .lock()
            .get(request.url.path())
            .cloned()
            .unwrap_or_else(|| "{}".to_string());
        Ok(HttpResponse::new(200, body))
    }
}

/// Token collaborator that counts refresh calls and can hold them open.
pub struct ScriptedTokens {
    refresh_calls: AtomicUsize,
    issued: Option<Token>,
    refreshed: Option<Token>,
    release: Option<Arc<Notify>>,
}

impl ScriptedTokens {
    pub fn new(issued: Option<Token>, refreshed: Option<Token>) -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            issued,
            refreshed,
            release: None,
        }
    }

    pub fn gated(mut self, release: Arc<Notify>) -> Self {
        self.release = Some(release);
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenService for ScriptedTokens {
    async fn issue_token(&self) -> AuthResult<Token> {
        self.issued
            .clone()
            .ok_or_else(|| AuthError::Transport("token endpoint returned status 401".to_string()))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> AuthResult<Token> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            release.notified().await;
        }
        self.refreshed
            .clone()
            .ok_or_else(|| AuthError::Transport("refresh endpoint returned status 401".to_string()))
    }
}

pub struct Harness {
    pub runtime: SessionRuntime,
    pub transport: Arc<ScriptedTransport>,
    pub tokens: Arc<ScriptedTokens>,
    pub redirector: Arc<RecordingRedirector>,
    pub vault: Arc<SessionVault>,
}

pub fn vault_with(stored: Option<SessionSnapshot>) -> Arc<SessionVault> {
    let vault = Arc::new(create_memory_vault());
    if let Some(snapshot) = stored {
        vault.save(&snapshot).unwrap();
    }
    vault
}

pub fn harness(
    vault: Arc<SessionVault>,
    transport: ScriptedTransport,
    tokens: ScriptedTokens,
    location: Option<Arc<PageLocation>>,
) -> Harness {
    let transport = Arc::new(transport);
    let tokens = Arc::new(tokens);
    let redirector = Arc::new(RecordingRedirector::new());
    let collaborators = SessionCollaborators {
        transport: transport.clone(),
        tokens: tokens.clone(),
        profile: Arc::new(HttpProfileService::from_config(&Config::default()).unwrap()),
        redirector: redirector.clone(),
        location,
    };
    let runtime = SessionRuntime::new(vault.clone(), TokenRotation::default(), collaborators);
    Harness {
        runtime,
        transport,
        tokens,
        redirector,
        vault,
    }
}
