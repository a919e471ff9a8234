//! Request tickets and outcomes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Counter for generating unique request IDs.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registration in the coordinator. Two `begin` calls for
/// the same key always get different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// What [`RequestCoordinator::begin`](crate::RequestCoordinator::begin)
/// hands back: the key, a unique id, and the cancellation token to thread
/// into the network call.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    pub(crate) key: String,
    pub(crate) id: RequestId,
    pub(crate) token: CancellationToken,
}

impl RequestTicket {
    /// The logical resource key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// This registration's id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The token to pass into the network call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this request was cancelled or superseded.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Result of a coordinated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome<T> {
    /// The operation ran to completion. `T` may itself be an error from
    /// the operation; the coordinator passes it through untouched.
    Completed(T),
    /// The request was cancelled or superseded before it finished. Its
    /// result, if any, is not authoritative and has been dropped.
    Cancelled,
}

impl<T> RequestOutcome<T> {
    /// Whether the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    /// Maps the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RequestOutcome<U> {
        match self {
            Self::Completed(value) => RequestOutcome::Completed(f(value)),
            Self::Cancelled => RequestOutcome::Cancelled,
        }
    }
}
