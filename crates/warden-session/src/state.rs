//! Session state machine and the records the controller owns.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use warden_protocol::{Notice, ServiceSession, StoredCredential, UserId};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of the client session.
///
/// ```text
///                  start / restore
/// Unauthenticated ───────────────→ Validating ←──────(periodic check)──┐
///                                     │  │  │                          │
///                                     │  │  └──(ok)──→ Authenticated ──┘
///                                     │  │                 ↑
///                      (near expiry)  │  └──(failure)──┐   │ (ok)
///                                     ↓                ↓   │
///                                 Refreshing ─(fail)─→ Terminated
///                                     └──────(ok)──────────┘
/// ```
///
/// - **Unauthenticated**: no credential is held.
/// - **Validating**: a "get current session" call is in flight.
/// - **Authenticated**: the credential was confirmed recently.
/// - **Refreshing**: the credential is close to expiry and a refresh call
///   is in flight.
/// - **Terminated**: the session ended. Only a new sign-in leaves this
///   state.
///
/// A network failure while checking puts the session back in the state it
/// had before the check. A credential that was just installed counts as
/// `Authenticated` for that purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Validating,
    Authenticated,
    Refreshing,
    Terminated,
}

impl SessionState {
    /// Whether the controller may move from `self` to `target`.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        match (self, target) {
            // A new sign-in (credential or pushed auth event).
            (Unauthenticated | Terminated, Validating | Authenticated) => true,
            (Validating, Authenticated | Refreshing) => true,
            (Authenticated, Validating | Authenticated) => true,
            (Refreshing, Authenticated) => true,
            // A new credential replaces one still being checked.
            (Validating | Refreshing, Validating) => true,
            // Everything live can end; sign-out also applies before sign-in.
            (Unauthenticated | Validating | Authenticated | Refreshing, Terminated) => true,
            _ => false,
        }
    }

    /// Whether a credential is held and the session has not ended.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Validating | Self::Authenticated | Self::Refreshing)
    }

    /// Whether a network call on behalf of the session is in flight.
    pub fn is_checking(&self) -> bool {
        matches!(self, Self::Validating | Self::Refreshing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Validating => write!(f, "Validating"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::Refreshing => write!(f, "Refreshing"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

// ---------------------------------------------------------------------------
// TerminationReason
// ---------------------------------------------------------------------------

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The service reported no session, or its expiry has passed.
    SessionExpired,
    /// A near-expiry refresh was rejected.
    RefreshFailed,
    /// Too many auth errors inside the error window.
    AuthErrorBudget,
    /// Validation kept failing and the last success is too old.
    ValidationStale,
    /// No user activity for the inactivity timeout.
    Inactivity,
    /// The user signed out here.
    SignedOut,
    /// The service reported a sign-out that happened elsewhere.
    RemoteSignOut,
}

impl TerminationReason {
    /// The notice shown to the user, if any. Deliberate sign-outs are
    /// silent.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::SessionExpired => Some(Notice::SessionExpired),
            Self::RefreshFailed => Some(Notice::RefreshFailed),
            Self::AuthErrorBudget => Some(Notice::AuthenticationFailed),
            Self::ValidationStale => Some(Notice::ValidationFailed),
            Self::Inactivity => Some(Notice::InactivitySignOut),
            Self::SignedOut | Self::RemoteSignOut => None,
        }
    }

    /// Whether the service still needs to be told about the sign-out.
    pub fn notifies_service(&self) -> bool {
        !matches!(self, Self::RemoteSignOut)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::SessionExpired => "session expired",
            Self::RefreshFailed => "refresh failed",
            Self::AuthErrorBudget => "too many authentication errors",
            Self::ValidationStale => "validation stale",
            Self::Inactivity => "inactivity",
            Self::SignedOut => "signed out",
            Self::RemoteSignOut => "signed out remotely",
        };
        f.write_str(text)
    }
}

// ---------------------------------------------------------------------------
// Session / ActivityState
// ---------------------------------------------------------------------------

/// The credential the controller currently holds.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserId,
    pub token: String,
    /// Absolute expiry in Unix seconds, if the service reported one.
    pub expires_at: Option<u64>,
    /// When the service last confirmed the credential. Set to the install
    /// time for a fresh credential.
    pub last_validated_at: Instant,
}

impl Session {
    pub(crate) fn from_credential(credential: StoredCredential) -> Self {
        Self {
            user: credential.user,
            token: credential.access_token,
            expires_at: credential.expires_at,
            last_validated_at: Instant::now(),
        }
    }

    pub(crate) fn from_service(session: ServiceSession) -> Self {
        Self {
            user: session.user,
            token: session.access_token,
            expires_at: session.expires_at,
            last_validated_at: Instant::now(),
        }
    }

    pub(crate) fn credential(&self) -> StoredCredential {
        StoredCredential {
            user: self.user.clone(),
            access_token: self.token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Activity and error bookkeeping.
#[derive(Debug, Clone)]
pub struct ActivityState {
    /// When the inactivity timer was last restarted.
    pub last_activity_at: Instant,
    /// Auth errors since the last success, inside the error window.
    pub consecutive_auth_errors: u32,
    pub last_error_at: Option<Instant>,
    /// Whether the idle warning was already published for the current
    /// inactivity period.
    pub idle_warned: bool,
}

impl ActivityState {
    pub(crate) fn new() -> Self {
        Self {
            last_activity_at: Instant::now(),
            consecutive_auth_errors: 0,
            last_error_at: None,
            idle_warned: false,
        }
    }

    pub(crate) fn reset_errors(&mut self) {
        self.consecutive_auth_errors = 0;
        self.last_error_at = None;
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// What observers see through [`SessionController::subscribe`](crate::SessionController::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// The signed-in user, while a session is live.
    pub user: Option<UserId>,
    /// Set once the session is terminated.
    pub reason: Option<TerminationReason>,
}

impl SessionStatus {
    pub(crate) fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            user: None,
            reason: None,
        }
    }
}
