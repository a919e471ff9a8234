//! Configuration for the TTL cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::VisibilityPolicy;

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default time-to-live for entries stored without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Configuration for a [`TtlCache`](crate::TtlCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before insertion-order eviction.
    pub capacity: usize,

    /// TTL used by [`TtlCache::set`](crate::TtlCache::set).
    pub default_ttl: Duration,

    /// How often the owner should call [`TtlCache::sweep`](crate::TtlCache::sweep).
    pub sweep_interval: Duration,

    /// What to do when the page comes back from the background.
    pub visibility: VisibilityPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            visibility: VisibilityPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the background sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the visibility policy.
    pub fn with_visibility(mut self, visibility: VisibilityPolicy) -> Self {
        self.visibility = visibility;
        self
    }

    /// Fix out-of-range values. Called by [`TtlCache::new`](crate::TtlCache::new).
    ///
    /// - `capacity` of 0 becomes 1
    /// - a zero `sweep_interval` falls back to the default
    /// - the visibility thresholds are put in order
    pub fn validated(mut self) -> Self {
        if self.capacity == 0 {
            tracing::warn!("cache capacity 0 is not usable, clamping to 1");
            self.capacity = 1;
        }
        if self.sweep_interval.is_zero() {
            self.sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        self.visibility = self.visibility.validated();
        self
    }
}
