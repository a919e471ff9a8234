//! Core types shared across Warden.
//!
//! These are the structures that cross a boundary: handed to us by the
//! session service, pushed to us by the host page, persisted in storage,
//! or shown to the user.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The identity of a signed-in user, as issued by the session service.
///
/// Newtype over the service's opaque id string. `#[serde(transparent)]`
/// keeps it a bare string in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Wraps an id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derived profile data for the signed-in user.
///
/// Loaded once per sign-in and kept in the TTL cache; the remaining
/// business fields of the profile table are out of scope here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Sessions as reported by the service
// ---------------------------------------------------------------------------

/// Current wall-clock time in whole seconds since the Unix epoch.
///
/// Token expiry is an absolute wall-clock timestamp chosen by the server,
/// so it is compared against wall-clock time rather than a monotonic clock.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// How much life a bearer credential has left at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// The service did not report an expiry.
    Unbounded,
    /// Still valid for this long.
    Remaining(Duration),
    /// Expiry has already passed.
    Expired,
}

/// A live session as returned by the service's "get current session".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSession {
    pub user: UserId,
    pub access_token: String,
    /// Absolute expiry, Unix seconds. `None` when the service omits it.
    pub expires_at: Option<u64>,
}

impl ServiceSession {
    /// Remaining lifetime of the credential measured at `now` (Unix seconds).
    pub fn lifetime_at(&self, now: u64) -> Lifetime {
        match self.expires_at {
            None => Lifetime::Unbounded,
            Some(at) if at > now => Lifetime::Remaining(Duration::from_secs(at - now)),
            Some(_) => Lifetime::Expired,
        }
    }
}

/// Credential material persisted through the host's storage adapter so a
/// reloaded tab can resume its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub user: UserId,
    pub access_token: String,
    pub expires_at: Option<u64>,
}

impl StoredCredential {
    /// Storage key the credential lives under.
    pub const STORAGE_KEY: &'static str = "warden.auth.token";

    /// Decodes and checks a stored credential.
    ///
    /// # Errors
    /// - `ProtocolError::Decode` if the text is not a credential
    /// - `ProtocolError::InvalidCredential` if the token is empty
    pub fn decode_with<C: Codec>(codec: &C, text: &str) -> Result<Self, ProtocolError> {
        let cred: Self = codec.decode(text)?;
        if cred.access_token.trim().is_empty() {
            return Err(ProtocolError::InvalidCredential(format!(
                "empty access token for user {}",
                cred.user
            )));
        }
        Ok(cred)
    }
}

impl From<&ServiceSession> for StoredCredential {
    fn from(session: &ServiceSession) -> Self {
        Self {
            user: session.user.clone(),
            access_token: session.access_token.clone(),
            expires_at: session.expires_at,
        }
    }
}

impl From<StoredCredential> for ServiceSession {
    fn from(cred: StoredCredential) -> Self {
        Self {
            user: cred.user,
            access_token: cred.access_token,
            expires_at: cred.expires_at,
        }
    }
}

/// Push notifications from the session service about changes that did not
/// originate from this core's own polling (sign-in in another tab, a
/// server-side revocation, a token refreshed by the service client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(ServiceSession),
    TokenRefreshed(ServiceSession),
    SignedOut,
}

// ---------------------------------------------------------------------------
// Presence signals from the host environment
// ---------------------------------------------------------------------------

/// The kind of user interaction that produced an activity signal.
///
/// Only a small fixed set is listened for; high-frequency events such as
/// pointer movement or scrolling are deliberately excluded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    PointerDown,
    KeyPress,
    TouchStart,
}

/// A presence signal raised by the host environment.
///
/// The host translates whatever platform events it has (page visibility,
/// connectivity, unload, input) into these; nothing in Warden depends on
/// platform event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceSignal {
    /// The page went to the background.
    Hidden,
    /// The page is visible again.
    Visible,
    /// Network connectivity came back.
    Online,
    /// Network connectivity was lost.
    Offline,
    /// The page is being unloaded.
    Unload,
    /// The user interacted with the page.
    Interaction(InteractionKind),
}

// ---------------------------------------------------------------------------
// Notices shown to the user
// ---------------------------------------------------------------------------

/// A user-visible notice published by the session controller.
///
/// Apart from [`Notice::IdleWarning`], each one accompanies a transition to
/// the terminated state and the host is expected to route the user to an
/// unauthenticated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    SessionExpired,
    RefreshFailed,
    AuthenticationFailed,
    ValidationFailed,
    InactivitySignOut,
    IdleWarning,
}

impl Notice {
    /// Human-readable message text.
    pub fn message(&self) -> &'static str {
        match self {
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::RefreshFailed => "Unable to refresh your session. Please sign in again.",
            Self::AuthenticationFailed => "Authentication error. Please sign in again.",
            Self::ValidationFailed => "Session validation failed. Please sign in again.",
            Self::InactivitySignOut => "You have been signed out due to inactivity.",
            Self::IdleWarning => {
                "You've been away for a while. Refreshing can help prevent loading issues."
            }
        }
    }

    /// Whether this notice means the user is no longer signed in.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::IdleWarning)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
