//! Session runtime.
//!
//! Assembles store, client, collaborators and pipeline so UI code and the CLI
//! share one authority for restore/login/logout/status.

use crate::client::AuthenticatedClient;
use crate::location::PageLocation;
use crate::pipeline::{EffectPipeline, EventDispatcher, PipelineContext, SessionEvent};
use crate::redirect::{Redirector, UrlRedirector};
use crate::services::{HttpProfileService, HttpTokenService, ProfileService, TokenService};
use crate::session_fsm::SessionStatus;
use crate::token_store::{SessionStateCallback, SessionView, TokenStore};
use crate::transport::{ReqwestTransport, Transport};
use crate::AuthResult;
use auth_config_and_utils::{Config, TokenRotation};
use session_storage::SessionPersistence;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// External collaborators the runtime wires together.
pub struct SessionCollaborators {
    pub transport: Arc<dyn Transport>,
    pub tokens: Arc<dyn TokenService>,
    pub profile: Arc<dyn ProfileService>,
    pub redirector: Arc<dyn Redirector>,
    pub location: Option<Arc<PageLocation>>,
}

impl SessionCollaborators {
    /// HTTP collaborators for the configured API.
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config)?);
        Ok(Self {
            tokens: Arc::new(HttpTokenService::from_config(config, transport.clone())?),
            profile: Arc::new(HttpProfileService::from_config(config)?),
            redirector: Arc::new(UrlRedirector::from_config(config)?),
            location: None,
            transport,
        })
    }

    pub fn with_location(mut self, location: PageLocation) -> Self {
        self.location = Some(Arc::new(location));
        self
    }

    pub fn with_redirector(mut self, redirector: Arc<dyn Redirector>) -> Self {
        self.redirector = redirector;
        self
    }
}

/// Shared session runtime.
pub struct SessionRuntime {
    store: Arc<TokenStore>,
    client: AuthenticatedClient,
    dispatcher: EventDispatcher,
    pipeline: Mutex<EffectPipeline>,
}

impl SessionRuntime {
    /// Restore the store from `persistence` and connect it to `collaborators`.
    pub fn new(
        persistence: Arc<dyn SessionPersistence>,
        rotation: TokenRotation,
        collaborators: SessionCollaborators,
    ) -> Self {
        let store = Arc::new(TokenStore::restore(persistence, rotation));
        let (dispatcher, events) = EventDispatcher::channel();
        let client = AuthenticatedClient::new(
            collaborators.transport,
            store.clone(),
            collaborators.tokens.clone(),
            dispatcher.downgrade(),
        );
        let pipeline = EffectPipeline::new(
            PipelineContext {
                store: store.clone(),
                client: client.clone(),
                tokens: collaborators.tokens,
                profile: collaborators.profile,
                redirector: collaborators.redirector,
                location: collaborators.location,
            },
            events,
        );

        Self {
            store,
            client,
            dispatcher,
            pipeline: Mutex::new(pipeline),
        }
    }

    /// Runtime over the HTTP collaborators described by `config`.
    pub fn from_config(config: &Config, persistence: Arc<dyn SessionPersistence>) -> AuthResult<Self> {
        let collaborators = SessionCollaborators::from_config(config)?;
        Ok(Self::new(persistence, config.token_rotation, collaborators))
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Read-only session projection for the UI.
    pub fn view(&self) -> SessionView {
        self.store.view()
    }

    pub fn status(&self) -> SessionStatus {
        self.store.status()
    }

    pub fn client(&self) -> AuthenticatedClient {
        self.client.clone()
    }

    pub fn dispatcher(&self) -> EventDispatcher {
        self.dispatcher.clone()
    }

    /// Set a callback to be notified whenever the session view changes.
    pub fn on_change(&self, callback: SessionStateCallback) {
        self.store.set_state_callback(callback);
    }

    pub fn restore(&self) {
        self.dispatcher.dispatch(SessionEvent::LoadSession);
    }

    pub fn login(&self) {
        self.dispatcher.dispatch(SessionEvent::Login);
    }

    pub fn logout(&self) {
        self.dispatcher.dispatch(SessionEvent::Logout);
    }

    /// Exchange the server-side session for a token.
    pub fn load_token(&self) {
        self.dispatcher.dispatch(SessionEvent::LoadToken);
    }

    pub fn clear_token(&self) {
        self.dispatcher.dispatch(SessionEvent::ClearToken);
    }

    /// Process everything dispatched so far, including follow-ups.
    pub async fn settle(&self) -> Vec<SessionEvent> {
        let processed = self.pipeline.lock().await.run_until_idle().await;
        if !processed.is_empty() {
            info!(
                events = processed.len(),
                status = ?self.store.status(),
                "Session settled"
            );
        }
        processed
    }
}
