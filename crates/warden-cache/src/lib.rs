//! Bounded key/value cache with per-entry expiry for Warden.
//!
//! Holds responses derived from the session (the user profile, small data
//! fetches) so a long-lived tab doesn't refetch them on every page, while
//! keeping memory bounded:
//!
//! - every entry carries its own TTL and is invisible once it has aged out
//! - the cache never holds more than `capacity` entries; a full cache
//!   evicts the entry that was inserted longest ago
//! - [`TtlCache::sweep`] drops expired entries in bulk, and
//!   [`VisibilityPolicy`] decides whether a tab returning from the
//!   background should sweep or clear outright
//!
//! All operations are synchronous and total: there is no error type.

mod cache;
mod config;
mod policy;

pub use cache::{CacheEntry, CacheStats, TtlCache};
pub use config::{CacheConfig, DEFAULT_CAPACITY, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
pub use policy::{CacheAction, VisibilityPolicy};
