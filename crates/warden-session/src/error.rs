//! Error types for the session layer.

/// Failures reported by a [`SessionService`](crate::SessionService).
///
/// The controller reacts to each category differently, so the service
/// implementation is responsible for classifying what went wrong:
///
/// | Variant      | Controller reaction                                  |
/// |--------------|------------------------------------------------------|
/// | `Network`    | logged, prior state restored, retried next tick      |
/// | `Auth`       | counted against the auth error budget                |
/// | `Aborted`    | ignored, never counted                               |
/// | `Unexpected` | terminates once validation has been stale too long   |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The request never got an answer: connection refused, DNS failure,
    /// offline, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The service rejected the credential (invalid, expired or revoked
    /// token).
    #[error("authentication error: {0}")]
    Auth(String),

    /// The call was cancelled before it finished.
    #[error("request aborted")]
    Aborted,

    /// Anything else the service reported.
    #[error("unexpected service error: {0}")]
    Unexpected(String),
}

impl ServiceError {
    /// Whether the error is a transport failure that says nothing about the
    /// credential itself.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Whether the error means the credential was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Failures from a host [`StorageBackend`](crate::StorageBackend).
///
/// The controller never propagates these: [`Storage`](crate::Storage)
/// logs and swallows them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Storage is not available at all (private browsing, disabled by
    /// policy, headless host without a backend).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend refused a write, usually because the quota is exhausted.
    #[error("storage rejected write to {key}: {reason}")]
    Rejected { key: String, reason: String },
}
