//! Token store: the single mutable source of session truth.
//!
//! Snapshot and machine state live under one lock so a reader can never see a
//! token that disagrees with the session state. Every mutation is written
//! through to the persistence collaborator once the lock is released; a save
//! older than the last one written is skipped.

use crate::refresh::RefreshGate;
use crate::session_fsm::{transition, SessionInput, SessionMachine, SessionStatus};
use crate::{AuthError, AuthResult};
use auth_config_and_utils::TokenRotation;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use session_storage::{SessionPersistence, SessionSnapshot, Token, UserInfo};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only projection of the session handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(skip_serializing)]
    pub access_token: String,
    pub user_name: String,
    pub status: SessionStatus,
}

impl SessionView {
    pub fn is_authenticated(&self) -> bool {
        self.status.is_authenticated() && !self.access_token.is_empty()
    }
}

/// Callback type for session change notifications.
pub type SessionStateCallback = Box<dyn Fn(SessionView) + Send + Sync>;

struct StoreInner {
    snapshot: SessionSnapshot,
    machine: SessionMachine,
    /// Bumped on every snapshot change.
    revision: u64,
}

/// A committed change waiting to be persisted and announced.
struct Committed {
    snapshot: SessionSnapshot,
    revision: u64,
    view: SessionView,
}

impl StoreInner {
    fn status(&self) -> SessionStatus {
        SessionStatus::from(self.machine.state())
    }

    fn view(&self) -> SessionView {
        SessionView {
            access_token: self.snapshot.token.access_token.clone(),
            user_name: self.snapshot.user_info.username.clone(),
            status: self.status(),
        }
    }

    fn consume(&mut self, input: &SessionInput) -> AuthResult<SessionStatus> {
        let old_status = self.status();
        self.machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_status
            ))
        })?;
        let new_status = self.status();
        if old_status != new_status {
            debug!(
                old_state = ?old_status,
                new_state = ?new_status,
                "Session state transition"
            );
        }
        Ok(new_status)
    }
}

/// Holds the current [`SessionSnapshot`] and session state.
pub struct TokenStore {
    inner: RwLock<StoreInner>,
    persistence: Arc<dyn SessionPersistence>,
    rotation: TokenRotation,
    refresh: RefreshGate,
    state_callback: Mutex<Option<SessionStateCallback>>,
    saved_revision: Mutex<u64>,
}

impl TokenStore {
    /// Create an empty store in the `Anonymous` state.
    pub fn new(persistence: Arc<dyn SessionPersistence>, rotation: TokenRotation) -> Self {
        Self::with_snapshot(SessionSnapshot::default(), persistence, rotation)
    }

    /// Create a store seeded from whatever the persistence collaborator holds.
    ///
    /// A missing or unreadable snapshot yields an empty session. The machine
    /// always starts in `Anonymous`; the `LoadSession` event decides the rest.
    pub fn restore(persistence: Arc<dyn SessionPersistence>, rotation: TokenRotation) -> Self {
        let snapshot = match persistence.load() {
            Ok(Some(snapshot)) => {
                info!(
                    has_access_token = snapshot.token.has_access_token(),
                    has_refresh_token = snapshot.token.has_refresh_token(),
                    "Restored stored session"
                );
                snapshot
            }
            Ok(None) => {
                info!("No stored session found");
                SessionSnapshot::default()
            }
            Err(e) => {
                warn!("Stored session could not be read, starting empty: {}", e);
                SessionSnapshot::default()
            }
        };
        Self::with_snapshot(snapshot, persistence, rotation)
    }

    fn with_snapshot(
        snapshot: SessionSnapshot,
        persistence: Arc<dyn SessionPersistence>,
        rotation: TokenRotation,
    ) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                snapshot,
                machine: SessionMachine::new(),
                revision: 0,
            }),
            persistence,
            rotation,
            refresh: RefreshGate::new(),
            state_callback: Mutex::new(None),
            saved_revision: Mutex::new(0),
        }
    }

    /// Set a callback to be notified whenever the session view changes.
    pub fn set_state_callback(&self, callback: SessionStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().snapshot.clone()
    }

    pub fn token(&self) -> Token {
        self.inner.read().snapshot.token.clone()
    }

    pub fn user_info(&self) -> UserInfo {
        self.inner.read().snapshot.user_info.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read().status()
    }

    pub fn view(&self) -> SessionView {
        self.inner.read().view()
    }

    pub fn rotation(&self) -> TokenRotation {
        self.rotation
    }

    /// The single-flight refresh slot belonging to this store.
    pub fn refresh_gate(&self) -> &RefreshGate {
        &self.refresh
    }

    /// Advance the session machine without touching the snapshot.
    pub fn apply(&self, input: SessionInput) -> AuthResult<SessionStatus> {
        let (status, view) = {
            let mut inner = self.inner.write();
            let old = inner.status();
            let status = inner.consume(&input)?;
            (status, (old != status).then(|| inner.view()))
        };
        if let Some(view) = view {
            self.notify(view);
        }
        Ok(status)
    }

    /// Replace the token wholesale.
    ///
    /// A non-empty access token moves the session to `Authenticated`; an empty
    /// one is recorded as a cleared token and never as authenticated.
    pub fn set_token(&self, token: Token) -> AuthResult<()> {
        let input = if token.has_access_token() {
            SessionInput::TokenFound
        } else {
            SessionInput::TokenCleared
        };
        self.mutate(&[input], |snapshot| snapshot.token = token)
    }

    pub fn set_user_info(&self, user_info: UserInfo) -> AuthResult<()> {
        self.mutate(&[], |snapshot| snapshot.user_info = user_info)
    }

    /// Drop the token but keep the user out of `LoggedOut`.
    pub fn clear_token(&self) -> AuthResult<()> {
        self.mutate(&[SessionInput::TokenCleared], |snapshot| {
            snapshot.token = Token::default()
        })
    }

    /// End the session: `LoggedOut` with all-empty, persisted defaults.
    pub fn reset(&self) -> AuthResult<()> {
        self.mutate(&[SessionInput::Logout], |snapshot| {
            *snapshot = SessionSnapshot::default()
        })
    }

    /// Start over for a fresh login: `Anonymous` with persisted defaults.
    pub fn begin_login(&self) -> AuthResult<()> {
        self.mutate(&[SessionInput::Logout, SessionInput::Login], |snapshot| {
            *snapshot = SessionSnapshot::default()
        })
    }

    /// The current token if the session is authenticated with an access token
    /// other than `rejected`.
    pub(crate) fn replaced_token(&self, rejected: &str) -> Option<Token> {
        let inner = self.inner.read();
        let token = &inner.snapshot.token;
        (inner.status().is_authenticated()
            && token.has_access_token()
            && token.access_token != rejected)
            .then(|| token.clone())
    }

    /// Enter `RefreshingToken` and hand back the refresh token to use.
    pub(crate) fn begin_refresh(&self) -> AuthResult<String> {
        let (refresh_token, view) = {
            let mut inner = self.inner.write();
            inner.consume(&SessionInput::Unauthorized)?;
            (inner.snapshot.token.refresh_token.clone(), inner.view())
        };
        self.notify(view);
        Ok(refresh_token)
    }

    /// Adopt a refreshed token according to the rotation policy.
    pub(crate) fn complete_refresh(&self, issued: Token) -> AuthResult<Token> {
        if !issued.has_access_token() {
            return Err(AuthError::TokenRefresh(
                "refresh response carried no access token".to_string(),
            ));
        }
        let mut merged = None;
        self.mutate(&[SessionInput::RefreshSucceeded], |snapshot| {
            let refresh_token = match self.rotation {
                TokenRotation::AdoptIssued if issued.has_refresh_token() => issued.refresh_token,
                _ => std::mem::take(&mut snapshot.token.refresh_token),
            };
            let token = Token::new(issued.access_token, refresh_token);
            snapshot.token = token.clone();
            merged = Some(token);
        })?;
        merged.ok_or_else(|| AuthError::TokenRefresh("token was not updated".to_string()))
    }

    /// The refresh failed: the session is over.
    ///
    /// Errors only if the session had already left `RefreshingToken`; a
    /// failed save is logged, since the session has ended either way.
    pub(crate) fn fail_refresh(&self) -> AuthResult<()> {
        let committed = self.commit(
            &[SessionInput::RefreshFailed],
            |_| true,
            |snapshot| *snapshot = SessionSnapshot::default(),
        )?;
        if let Some(committed) = committed {
            if let Err(e) = self.publish(committed) {
                debug!("Ended session not persisted: {}", e);
            }
        }
        Ok(())
    }

    /// End the session if it is still authenticated with `rejected`.
    ///
    /// Returns whether this call ended it, so that a burst of requests
    /// rejected with the same credential ends the session once.
    pub(crate) fn expire(&self, rejected: &str) -> bool {
        let committed = self.commit(
            &[SessionInput::Logout],
            |inner| {
                inner.status().is_authenticated() && inner.snapshot.token.access_token == rejected
            },
            |snapshot| *snapshot = SessionSnapshot::default(),
        );
        match committed {
            Ok(Some(committed)) => {
                if let Err(e) = self.publish(committed) {
                    debug!("Expired session not persisted: {}", e);
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!("Session already moved on: {}", e);
                false
            }
        }
    }

    /// Apply `inputs` in order and `update` the snapshot under one write lock,
    /// then persist and announce the result. Nothing changes if any input is
    /// rejected.
    fn mutate(
        &self,
        inputs: &[SessionInput],
        update: impl FnOnce(&mut SessionSnapshot),
    ) -> AuthResult<()> {
        match self.commit(inputs, |_| true, update)? {
            Some(committed) => self.publish(committed),
            None => Ok(()),
        }
    }

    /// The locked half of a mutation. Returns `None` when `guard` declines.
    fn commit(
        &self,
        inputs: &[SessionInput],
        guard: impl FnOnce(&StoreInner) -> bool,
        update: impl FnOnce(&mut SessionSnapshot),
    ) -> AuthResult<Option<Committed>> {
        let mut inner = self.inner.write();
        if !guard(&inner) {
            return Ok(None);
        }
        let mut next = inner.machine.state().clone();
        for input in inputs {
            next = transition(&next, input).ok_or_else(|| {
                AuthError::InvalidStateTransition(format!(
                    "Cannot apply {:?} in state {:?}",
                    input,
                    SessionStatus::from(&next)
                ))
            })?;
        }
        for input in inputs {
            inner.consume(input)?;
        }

        update(&mut inner.snapshot);
        inner.revision += 1;
        Ok(Some(Committed {
            snapshot: inner.snapshot.clone(),
            revision: inner.revision,
            view: inner.view(),
        }))
    }

    /// Persist a committed change and notify the callback. Runs without the
    /// store lock held.
    fn publish(&self, committed: Committed) -> AuthResult<()> {
        let persisted = {
            let mut saved = self.saved_revision.lock();
            if *saved >= committed.revision {
                debug!(
                    revision = committed.revision,
                    saved = *saved,
                    "Skipping save of superseded snapshot"
                );
                Ok(())
            } else {
                let result = self.persistence.save(&committed.snapshot);
                if result.is_ok() {
                    *saved = committed.revision;
                }
                result
            }
        };
        self.notify(committed.view);
        persisted.map_err(|e| {
            warn!("Failed to persist session: {}", e);
            AuthError::from(e)
        })
    }

    fn notify(&self, view: SessionView) {
        let cb = self.state_callback.lock();
        if let Some(callback) = cb.as_ref() {
            callback(view);
        }
    }
}
