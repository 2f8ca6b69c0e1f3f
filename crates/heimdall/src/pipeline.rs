//! Event-driven effect pipeline.
//!
//! Intents and collaborator results arrive as [`SessionEvent`]s. Each event is
//! processed to completion, then its follow-up events are queued behind
//! everything already waiting. Nothing else sequences session changes.

use crate::client::AuthenticatedClient;
use crate::location::PageLocation;
use crate::redirect::Redirector;
use crate::services::{ProfileService, TokenService};
use crate::session_fsm::SessionInput;
use crate::token_store::TokenStore;
use crate::AuthResult;
use session_storage::{Token, UserInfo};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Session intent or collaborator result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Empty,
    Login,
    Logout,
    LoadSession,
    LoadToken,
    LoadUserInfo,
    SetToken(Token),
    SetUserInfo(UserInfo),
    ClearToken,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Empty => "empty",
            SessionEvent::Login => "login",
            SessionEvent::Logout => "logout",
            SessionEvent::LoadSession => "load_session",
            SessionEvent::LoadToken => "load_token",
            SessionEvent::LoadUserInfo => "load_user_info",
            SessionEvent::SetToken(_) => "set_token",
            SessionEvent::SetUserInfo(_) => "set_user_info",
            SessionEvent::ClearToken => "clear_token",
        }
    }
}

#[derive(Clone)]
enum EventSender {
    Strong(mpsc::UnboundedSender<SessionEvent>),
    Weak(mpsc::WeakUnboundedSender<SessionEvent>),
}

/// Cloneable handle for feeding events into an [`EffectPipeline`].
#[derive(Clone)]
pub struct EventDispatcher {
    tx: EventSender,
}

impl EventDispatcher {
    /// A dispatcher and the receiving end the pipeline consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: EventSender::Strong(tx),
            },
            rx,
        )
    }

    /// A dispatcher that does not keep the pipeline's channel open. Components
    /// owned by the pipeline itself hold one of these so that
    /// [`EffectPipeline::run`] still ends once every outside dispatcher is gone.
    pub fn downgrade(&self) -> Self {
        let weak = match &self.tx {
            EventSender::Strong(tx) => tx.downgrade(),
            EventSender::Weak(weak) => weak.clone(),
        };
        Self {
            tx: EventSender::Weak(weak),
        }
    }

    pub fn dispatch(&self, event: SessionEvent) {
        debug!(event = event.name(), "Dispatching event");
        let sent = match &self.tx {
            EventSender::Strong(tx) => tx.send(event).is_ok(),
            EventSender::Weak(weak) => weak.upgrade().is_some_and(|tx| tx.send(event).is_ok()),
        };
        if !sent {
            warn!("Event pipeline is gone, event dropped");
        }
    }
}

/// Collaborators the pipeline drives.
pub struct PipelineContext {
    pub store: Arc<TokenStore>,
    pub client: AuthenticatedClient,
    pub tokens: Arc<dyn TokenService>,
    pub profile: Arc<dyn ProfileService>,
    pub redirector: Arc<dyn Redirector>,
    pub location: Option<Arc<PageLocation>>,
}

/// Sequential event processor.
pub struct EffectPipeline {
    ctx: PipelineContext,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    queue: VecDeque<SessionEvent>,
}

impl EffectPipeline {
    pub fn new(ctx: PipelineContext, events: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self {
            ctx,
            events,
            queue: VecDeque::new(),
        }
    }

    /// Process one event and return its follow-ups without queueing them.
    pub async fn process(&self, event: SessionEvent) -> Vec<SessionEvent> {
        debug!(event = event.name(), status = ?self.ctx.store.status(), "Processing event");
        match event {
            SessionEvent::LoadSession => self.load_session(),
            SessionEvent::Login => {
                log_failure("reset session for login", self.ctx.store.begin_login());
                self.ctx.redirector.login();
                vec![]
            }
            SessionEvent::Logout => {
                self.ctx.redirector.logout();
                log_failure("reset session on logout", self.ctx.store.reset());
                vec![]
            }
            SessionEvent::LoadToken => match self.ctx.tokens.issue_token().await {
                Ok(token) => vec![SessionEvent::SetToken(token)],
                Err(e) => {
                    warn!("Token issuance failed: {}", e);
                    vec![SessionEvent::Login]
                }
            },
            SessionEvent::LoadUserInfo => {
                match self.ctx.profile.get_user_info(&self.ctx.client).await {
                    Ok(user_info) => vec![SessionEvent::SetUserInfo(user_info)],
                    Err(e) => {
                        debug!("User info unavailable: {}", e);
                        vec![SessionEvent::Empty]
                    }
                }
            }
            SessionEvent::SetToken(token) => {
                let authenticated = token.has_access_token();
                match self.ctx.store.set_token(token) {
                    Ok(()) if authenticated => vec![SessionEvent::LoadUserInfo],
                    Ok(()) => vec![],
                    Err(e) => {
                        warn!("Token rejected: {}", e);
                        vec![SessionEvent::Empty]
                    }
                }
            }
            SessionEvent::SetUserInfo(user_info) => {
                info!(username = %user_info.username, "User info loaded");
                log_failure("store user info", self.ctx.store.set_user_info(user_info));
                vec![]
            }
            SessionEvent::ClearToken => {
                log_failure("clear token", self.ctx.store.clear_token());
                vec![]
            }
            SessionEvent::Empty => vec![],
        }
    }

    fn load_session(&self) -> Vec<SessionEvent> {
        let store = &self.ctx.store;
        if let Err(e) = store.apply(SessionInput::LoadSession) {
            warn!("Session restore ignored: {}", e);
            return vec![SessionEvent::Empty];
        }

        let override_token = self
            .ctx
            .location
            .as_ref()
            .and_then(|location| location.take_access_token());
        if let Some(access_token) = override_token {
            info!("Using access token handed over in the page URL");
            return vec![SessionEvent::SetToken(Token::access_only(access_token))];
        }

        let (input, follow_up) = if store.token().has_access_token() {
            (SessionInput::TokenFound, SessionEvent::LoadUserInfo)
        } else {
            (SessionInput::TokenAbsent, SessionEvent::Login)
        };
        match store.apply(input) {
            Ok(status) => {
                info!(status = ?status, "Session restored");
                vec![follow_up]
            }
            Err(e) => {
                error!("Session restore could not complete: {}", e);
                vec![SessionEvent::Empty]
            }
        }
    }

    /// Process every queued and dispatched event, including follow-ups, until
    /// nothing is left. Returns the events processed, in order.
    pub async fn run_until_idle(&mut self) -> Vec<SessionEvent> {
        let mut processed = Vec::new();
        loop {
            while let Ok(event) = self.events.try_recv() {
                self.queue.push_back(event);
            }
            let Some(event) = self.queue.pop_front() else {
                break;
            };
            let follow_ups = self.process(event.clone()).await;
            processed.push(event);
            self.queue.extend(follow_ups);
        }
        processed
    }

    /// Process events until every dispatcher is dropped.
    pub async fn run(mut self) {
        info!("Session pipeline started");
        while let Some(event) = self.events.recv().await {
            self.queue.push_back(event);
            self.run_until_idle().await;
        }
        info!("Session pipeline stopped");
    }
}

fn log_failure(action: &str, result: AuthResult<()>) {
    if let Err(e) = result {
        warn!("Failed to {}: {}", action, e);
    }
}
