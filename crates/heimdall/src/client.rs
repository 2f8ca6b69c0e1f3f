//! Authenticated HTTP client.
//!
//! Wraps a plain [`Transport`] with bearer attachment and a bounded
//! refresh-and-retry cycle on 401:
//!
//! ```text
//! send ──► attach Bearer <snapshot> ──► transport ──► not 401 ──► caller
//!                                           │
//!                                          401
//!                                           │
//!              retried already? ── yes ──► expire session, AuthExpired
//!                                           │ no
//!              join single-flight refresh ── fails ──► AuthExpired
//!              (a token that replaced ours in the meantime counts as refreshed)
//!                                           │ ok
//!                                  retry once with new token
//! ```
//!
//! A failed refresh ends the session from the refresh task, which dispatches
//! the `Login` event. A rejected retry ends it here, but only for the first
//! request to be rejected with that credential.

use crate::pipeline::{EventDispatcher, SessionEvent};
use crate::request_registry::{Registration, RequestHandle, RequestId, RequestRegistry, RequestScope};
use crate::services::TokenService;
use crate::token_store::TokenStore;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::{AuthError, AuthResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// HTTP client that authenticates every request from the [`TokenStore`].
///
/// Clones share the store, the refresh slot and the request registry.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    tokens: Arc<dyn TokenService>,
    events: EventDispatcher,
    registry: RequestRegistry,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        tokens: Arc<dyn TokenService>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            transport,
            store,
            tokens,
            events,
            registry: RequestRegistry::new(),
        }
    }

    /// A client sharing everything but the registry, which belongs to `scope`.
    pub fn with_scope(&self, scope: &RequestScope) -> Self {
        Self {
            registry: scope.registry().clone(),
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Send `request` with the current credential, recovering once from a 401.
    pub async fn send(&self, request: HttpRequest) -> AuthResult<HttpResponse> {
        let used_token = self.store.token().access_token;
        let response = self.attempt(&request, &used_token).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        if request.is_retry() {
            return Err(self.session_expired(&used_token, "request was rejected after a retry"));
        }

        let fresh_token = self.recover(&used_token).await?;
        let response = self.attempt(&request.into_retry(), &fresh_token).await?;
        if response.is_unauthorized() {
            return Err(self.session_expired(&fresh_token, "refreshed credential was rejected"));
        }
        Ok(response)
    }

    /// Send `request` on its own task, returning a handle that can cancel it
    /// and the pending response.
    pub fn send_cancellable(&self, request: HttpRequest) -> (RequestHandle, PendingResponse) {
        let Registration {
            handle,
            mut cancelled,
        } = self.registry.register();
        let id = handle.id();
        let client = self.clone();

        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                Ok(reason) = &mut cancelled => {
                    debug!(request_id = %id, reason = %reason, "Request cancelled");
                    Err(AuthError::Cancelled(reason))
                }
                result = client.send(request) => result,
            };
            client.registry.complete(id);
            outcome
        });

        (handle, PendingResponse { id, task })
    }

    /// Cancel every request this client's registry is tracking.
    pub fn cancel_all(&self, reason: Option<&str>) -> usize {
        self.registry.cancel_all(reason)
    }

    async fn attempt(&self, request: &HttpRequest, token: &str) -> AuthResult<HttpResponse> {
        let mut request = request.clone();
        request.set_bearer(token);
        debug!(
            method = %request.method,
            url = %request.url,
            retry = request.is_retry(),
            "Sending request"
        );
        self.transport.send(request).await
    }

    /// Obtain a credential newer than `used_token`.
    async fn recover(&self, used_token: &str) -> AuthResult<String> {
        let gate = self.store.refresh_gate();
        match gate
            .join(&self.store, &self.tokens, &self.events, used_token)
            .await
        {
            Ok(token) => Ok(token.access_token),
            Err(e) => {
                warn!("Could not refresh credential: {}", e);
                Err(AuthError::AuthExpired)
            }
        }
    }

    /// `rejected` was refused even though it should have been good. The first
    /// caller to report it ends the session and starts a new login.
    fn session_expired(&self, rejected: &str, cause: &str) -> AuthError {
        if self.store.expire(rejected) {
            warn!(cause, "Session expired");
            self.events.dispatch(SessionEvent::Login);
        } else {
            debug!(cause, "Session already ended");
        }
        AuthError::AuthExpired
    }
}

/// Response of a request started with
/// [`send_cancellable`](AuthenticatedClient::send_cancellable).
///
/// Dropping it does not cancel the request; use the handle for that.
pub struct PendingResponse {
    id: RequestId,
    task: JoinHandle<AuthResult<HttpResponse>>,
}

impl PendingResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for PendingResponse {
    type Output = AuthResult<HttpResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(e)) => Poll::Ready(Err(AuthError::Transport(format!(
                "request task failed: {}",
                e
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}
