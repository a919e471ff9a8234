//! # Warden
//!
//! Client-side session lifecycle and resource management.
//!
//! Warden keeps a browser-style session alive while a tab is open and
//! ends it cleanly when it must: it validates the credential on a timer
//! and on presence changes, refreshes it before it expires, budgets auth
//! failures, signs idle users out, and on teardown cancels in-flight
//! requests and drops cached data.
//!
//! The host supplies two things: a [`SessionService`] that talks to the
//! auth backend, and a [`StorageBackend`] for the persisted credential.
//! Everything else (timers, caching, request supersession) is built in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warden::prelude::*;
//!
//! // Implement SessionService for your backend, then:
//! // let warden = Warden::builder(my_service)
//! //     .storage(Storage::new(my_backend))
//! //     .build()
//! //     .await;
//! // warden.handle_presence(PresenceSignal::Hidden).await;
//! ```

mod config;
mod error;
mod fetch;
mod logging;
mod runtime;

pub use config::WardenConfig;
pub use error::WardenError;
pub use fetch::MemoryAwareFetch;
pub use logging::init_logging;
pub use runtime::{Warden, WardenBuilder};

// Re-export sub-crates for advanced use.
pub use warden_cache as cache;
pub use warden_protocol as protocol;
pub use warden_request as request;
pub use warden_session as session;
pub use warden_timer as timer;

pub use warden_session::{SessionService, StorageBackend};

/// Everything a typical host needs.
pub mod prelude {
    pub use crate::{MemoryAwareFetch, Warden, WardenBuilder, WardenConfig, WardenError};
    pub use warden_cache::{CacheConfig, TtlCache, VisibilityPolicy};
    pub use warden_protocol::{
        AuthEvent, InteractionKind, Notice, PresenceSignal, ServiceSession, StoredCredential,
        UserId, UserProfile,
    };
    pub use warden_request::{CancellationToken, RequestCoordinator, RequestOutcome};
    pub use warden_session::{
        MemoryStorage, ServiceError, SessionConfig, SessionController, SessionService,
        SessionState, SessionStatus, Storage, StorageBackend, StorageError, TerminationReason,
    };
}
