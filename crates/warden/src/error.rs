//! Unified error type for Warden.

use warden_protocol::ProtocolError;
use warden_session::{ServiceError, StorageError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `warden` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Credential (de)serialization.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A failure reported by the session service.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A failure reported by the host storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A global tracing subscriber is already installed.
    #[error("logging init failed: {0}")]
    Logging(String),
}
