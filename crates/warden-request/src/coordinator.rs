//! The request coordinator: one cancellable registration per key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::{RequestId, RequestOutcome, RequestTicket};

/// A registered, not yet finished request.
#[derive(Debug)]
struct PendingRequest {
    id: RequestId,
    token: CancellationToken,
}

/// Registry of in-flight requests, keyed by logical resource.
///
/// ## Lifecycle
///
/// ```text
/// begin(k) ──→ [pending k] ──→ finish(ticket) / cleanup(k)   (completed)
///                  │
///                  ├──→ begin(k) again ──→ old token cancelled (superseded)
///                  ├──→ cancel(k)
///                  └──→ cancel_all()
/// ```
///
/// Constructed explicitly and shared through `Arc`; there is no global
/// instance.
#[derive(Debug, Default)]
pub struct RequestCoordinator {
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl RequestCoordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new request for `key`, cancelling any request already
    /// registered for it.
    pub fn begin(&self, key: impl Into<String>) -> RequestTicket {
        let key = key.into();
        let id = RequestId::next();
        let token = CancellationToken::new();

        let previous = self.lock().insert(
            key.clone(),
            PendingRequest {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            tracing::debug!(
                key = %key,
                superseded = %previous.id,
                by = %id,
                "request superseded"
            );
        }

        RequestTicket { key, id, token }
    }

    /// Cancels the request registered for `key` and removes it. Returns
    /// whether there was one.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().remove(key) {
            Some(request) => {
                request.token.cancel();
                tracing::debug!(key = %key, request = %request.id, "request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels and removes every registered request. Returns how many were
    /// cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(String, PendingRequest)> = self.lock().drain().collect();
        for (_, request) in &drained {
            request.token.cancel();
        }
        if !drained.is_empty() {
            tracing::info!(cancelled = drained.len(), "all pending requests cancelled");
        }
        drained.len()
    }

    /// Removes the registration for `key` without cancelling it (the
    /// request completed). Returns whether there was one.
    pub fn cleanup(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Like [`cleanup`](Self::cleanup), but only if the registration for
    /// the ticket's key is still this ticket's. A superseded request that
    /// completes late must not remove its successor.
    pub fn finish(&self, ticket: &RequestTicket) -> bool {
        let mut pending = self.lock();
        match pending.get(&ticket.key) {
            Some(current) if current.id == ticket.id => {
                pending.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }

    /// Runs `op` as the request for `key`.
    ///
    /// `op` receives the request's cancellation token and should pass it on
    /// to whatever does the I/O. If the request is cancelled or superseded
    /// before `op` finishes, `op`'s future is dropped and the outcome is
    /// [`RequestOutcome::Cancelled`]; otherwise it is `op`'s output,
    /// errors included, untouched.
    pub async fn run<T, F, Fut>(&self, key: impl Into<String>, op: F) -> RequestOutcome<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.begin(key);
        let token = ticket.token.clone();

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => RequestOutcome::Cancelled,
            value = op(ticket.token.clone()) => {
                // Completed in the same poll that a cancel landed: the
                // cancel wins, the result is stale.
                if token.is_cancelled() {
                    RequestOutcome::Cancelled
                } else {
                    RequestOutcome::Completed(value)
                }
            }
        };

        self.finish(&ticket);
        outcome
    }

    /// Whether a request is registered for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of registered requests.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Keys with a registered request, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}
