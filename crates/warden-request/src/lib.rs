//! Per-key request coordination for Warden.
//!
//! Every network call the core makes is registered here under a logical
//! key ("session:validate", "user-profile-42", ...). The registry enforces
//! two rules:
//!
//! 1. **Supersession**: at most one request per key is outstanding. A new
//!    [`RequestCoordinator::begin`] for a key cancels the previous one.
//! 2. **Teardown**: [`RequestCoordinator::cancel_all`] cancels everything,
//!    so no network work outlives the session that started it.
//!
//! Cancellation is cooperative: each request carries a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) that the
//! caller threads into the actual network call. A cancelled request
//! resolves to [`RequestOutcome::Cancelled`], which callers treat as
//! "ignore", never as a failure.

mod coordinator;
mod ticket;

pub use coordinator::RequestCoordinator;
pub use ticket::{RequestId, RequestOutcome, RequestTicket};
pub use tokio_util::sync::CancellationToken;
