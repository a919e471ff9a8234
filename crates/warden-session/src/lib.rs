//! Session lifecycle management for Warden.
//!
//! This crate keeps a client-side session valid for as long as the tab is
//! open, and ends it when it has to:
//!
//! 1. **Validation**: periodic and event-driven checks against the session
//!    service ([`SessionService`] trait), refreshing credentials that are
//!    about to expire
//! 2. **Failure policy**: network errors are tolerated, auth errors are
//!    budgeted, stale validation eventually gives up
//! 3. **Inactivity**: an idle warning, then a sign-out
//! 4. **Teardown**: sign-out cancels every request, clears the cache and
//!    forgets the stored credential, whether or not the service answers
//!
//! # How it fits in the stack
//!
//! ```text
//! Runtime (above)        ← routes presence signals and auth events here
//!     ↕
//! Session (this crate)   ← owns the session state machine
//!     ↕
//! Cache / Request / Timer / Protocol (below)
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod controller;
mod error;
mod service;
mod state;
mod storage;

pub use config::SessionConfig;
pub use controller::{
    REFRESH_REQUEST, SIGN_OUT_REQUEST, SessionController, SessionControllerBuilder,
    VALIDATE_REQUEST, profile_cache_key,
};
pub use error::{ServiceError, StorageError};
pub use service::SessionService;
pub use state::{ActivityState, Session, SessionState, SessionStatus, TerminationReason};
pub use storage::{MemoryStorage, Storage, StorageBackend};
