//! Error types for the protocol layer.
//!
//! Each crate in Warden defines its own error enum. A `ProtocolError`
//! always means the problem is in (de)serializing or validating shared
//! data, never in networking or session policy.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into text).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning stored text back into a value).
    ///
    /// Common causes: a credential written by an older client, or text
    /// that another script on the page left under the same storage key.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value decoded fine but is not usable, e.g. a stored
    /// credential with an empty access token.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}
