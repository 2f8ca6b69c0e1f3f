//! Single-flight token refresh.
//!
//! At most one refresh runs per [`TokenStore`]. The first request to see a 401
//! starts it on its own task; every request that arrives before it settles
//! awaits the same shared result. The task owns the refresh, so cancelling
//! any joiner never cancels it. When the refresh ends the session, the task
//! dispatches the one `Login` event for it, whether or not anyone is still
//! waiting.

use crate::pipeline::{EventDispatcher, SessionEvent};
use crate::services::TokenService;
use crate::token_store::TokenStore;
use crate::{AuthError, AuthResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use session_storage::Token;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type SharedRefresh = Shared<BoxFuture<'static, Result<Token, String>>>;

struct InFlight {
    generation: u64,
    result: SharedRefresh,
}

/// Memoised in-flight refresh, cleared once the refresh settles.
pub struct RefreshGate {
    in_flight: Arc<Mutex<Option<InFlight>>>,
    started: AtomicU64,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshGate {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(None)),
            started: AtomicU64::new(0),
        }
    }

    /// Number of refresh calls started through this gate.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Join the in-flight refresh for `store`, starting one if none is running.
    ///
    /// `rejected_token` is the access token the server just refused. If the
    /// store already holds a different one, a refresh settled in the meantime
    /// and its token is returned without starting another. `events` receives
    /// the `Login` event if the refresh ends the session.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn join(
        &self,
        store: &Arc<TokenStore>,
        tokens: &Arc<dyn TokenService>,
        events: &EventDispatcher,
        rejected_token: &str,
    ) -> AuthResult<Token> {
        let shared = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(generation = in_flight.generation, "Joining in-flight refresh");
                    in_flight.result.clone()
                }
                None => {
                    if let Some(current) = store.replaced_token(rejected_token) {
                        debug!("Credential already replaced, skipping refresh");
                        return Ok(current);
                    }
                    let refresh_token = store.begin_refresh()?;
                    let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(generation, "Starting token refresh");

                    let task = tokio::spawn(run_refresh(
                        store.clone(),
                        tokens.clone(),
                        events.clone(),
                        refresh_token,
                        self.in_flight.clone(),
                        generation,
                    ));
                    let result: SharedRefresh = async move {
                        match task.await {
                            Ok(outcome) => outcome,
                            Err(e) => Err(format!("refresh task failed: {}", e)),
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(InFlight {
                        generation,
                        result: result.clone(),
                    });
                    result
                }
            }
        };

        shared.await.map_err(AuthError::TokenRefresh)
    }
}

async fn run_refresh(
    store: Arc<TokenStore>,
    tokens: Arc<dyn TokenService>,
    events: EventDispatcher,
    refresh_token: String,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    generation: u64,
) -> Result<Token, String> {
    let issued = if refresh_token.is_empty() {
        Err(AuthError::TokenRefresh("no refresh token available".to_string()))
    } else {
        tokens.refresh_token(&refresh_token).await
    };

    let outcome = match issued.and_then(|token| store.complete_refresh(token)) {
        Ok(token) => {
            info!(generation, "Token refreshed successfully");
            Ok(token)
        }
        Err(e) => {
            warn!(generation, "Token refresh failed: {}", e);
            match store.fail_refresh() {
                Ok(()) => events.dispatch(SessionEvent::Login),
                Err(fail_err) => {
                    debug!("Session already moved on after failed refresh: {}", fail_err)
                }
            }
            Err(e.to_string())
        }
    };

    let mut slot = in_flight.lock();
    if slot.as_ref().is_some_and(|current| current.generation == generation) {
        *slot = None;
    }
    outcome
}
