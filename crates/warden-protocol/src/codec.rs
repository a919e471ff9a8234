//! Codec trait and implementations for persisted credential material.
//!
//! Browser-style storage adapters only hold strings, so unlike a wire
//! codec this one converts between Rust values and *text*. Credential
//! persistence goes through a [`Codec`] rather than `serde_json` directly,
//! which keeps the storage format swappable.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust values to text and decode text back.
///
/// `Send + Sync + 'static` so a codec can be stored in types that cross
/// tokio tasks. The session storage wrapper currently uses [`JsonCodec`]
/// by value at each call.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a string suitable for a storage adapter.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a stored string back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or does
    /// not match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that stores values as JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use warden_protocol::{Codec, JsonCodec, StoredCredential, UserId};
///
/// let codec = JsonCodec;
/// let cred = StoredCredential {
///     user: UserId::new("u-1"),
///     access_token: "abc".into(),
///     expires_at: Some(1_700_000_000),
/// };
///
/// let text = codec.encode(&cred).unwrap();
/// let back: StoredCredential = codec.decode(&text).unwrap();
/// assert_eq!(cred, back);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(data).map_err(ProtocolError::Decode)
    }
}
