//! Bookkeeping for cancellable in-flight requests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Reason recorded when a handle is cancelled without one.
pub const DEFAULT_CANCEL_REASON: &str = "request cancelled by caller";

/// Reason recorded by [`RequestRegistry::cancel_all`] without one.
pub const CANCEL_ALL_REASON: &str = "all requests cancelled";

/// Reason used when a [`RequestScope`] is dropped.
pub const SCOPE_DROPPED_REASON: &str = "scope dropped";

/// Identifier of a registered request. Ids come from a per-registry counter
/// and are never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: Mutex<HashMap<RequestId, oneshot::Sender<String>>>,
}

/// Tracks in-flight cancellable operations keyed by [`RequestId`].
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    inner: Arc<RegistryInner>,
}

/// A freshly registered operation: the caller-facing handle plus the signal
/// the operation listens on.
pub struct Registration {
    pub handle: RequestHandle,
    pub cancelled: oneshot::Receiver<String>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation.
    pub fn register(&self) -> Registration {
        let id = RequestId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = oneshot::channel();
        self.inner.entries.lock().insert(id, tx);
        debug!(request_id = %id, "Registered request");
        Registration {
            handle: RequestHandle {
                id,
                registry: self.clone(),
            },
            cancelled: rx,
        }
    }

    /// Remove bookkeeping after natural completion. Returns whether the id was
    /// still registered.
    pub fn complete(&self, id: RequestId) -> bool {
        self.inner.entries.lock().remove(&id).is_some()
    }

    /// Signal cancellation of `id` and forget it. A no-op when the id already
    /// completed or was cancelled.
    pub fn cancel(&self, id: RequestId, reason: Option<&str>) -> bool {
        let Some(tx) = self.inner.entries.lock().remove(&id) else {
            return false;
        };
        let reason = reason.unwrap_or(DEFAULT_CANCEL_REASON);
        debug!(request_id = %id, reason, "Cancelling request");
        // The operation may have finished between removal and send.
        let _ = tx.send(reason.to_string());
        true
    }

    /// Cancel every tracked operation and leave the registry empty. Returns the
    /// number of operations cancelled.
    pub fn cancel_all(&self, reason: Option<&str>) -> usize {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();
        let reason = reason.unwrap_or(CANCEL_ALL_REASON);
        if !drained.is_empty() {
            debug!(count = drained.len(), reason, "Cancelling all requests");
        }
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(reason.to_string());
        }
        count
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.inner.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caller-owned handle to a registered operation.
#[derive(Clone)]
pub struct RequestHandle {
    id: RequestId,
    registry: RequestRegistry,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Cancel the operation. Idempotent.
    pub fn cancel(&self, reason: Option<&str>) {
        self.registry.cancel(self.id, reason);
    }

    /// True until the operation completes or is cancelled.
    pub fn is_active(&self) -> bool {
        self.registry.contains(self.id)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle").field("id", &self.id).finish()
    }
}

/// A registry tied to an owning scope such as a view. Everything still
/// registered is cancelled when the scope is dropped.
#[derive(Default)]
pub struct RequestScope {
    registry: RequestRegistry,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.registry.cancel_all(Some(SCOPE_DROPPED_REASON));
    }
}
