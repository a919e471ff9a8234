//! Shared vocabulary for Warden.
//!
//! Every other Warden crate speaks in terms of the types defined here:
//!
//! - **Types** ([`ServiceSession`], [`AuthEvent`], [`PresenceSignal`],
//!   [`Notice`], etc.): what the session service hands us, what the host
//!   page tells us, and what we tell the user.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how persisted credential
//!   material is turned into the text a key/value storage adapter accepts.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! ```text
//! Host page (events, storage) → Protocol (signals, credentials) → Session controller
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AuthEvent, InteractionKind, Lifetime, Notice, PresenceSignal,
    ServiceSession, StoredCredential, UserId, UserProfile, unix_now,
};
