//! How long a tab may sit in the background before its cache is trimmed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do with the cache when the page becomes visible again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Hidden briefly; leave the cache alone.
    Keep,
    /// Hidden for a while; drop expired entries.
    Sweep,
    /// Hidden for a long time; drop everything.
    Clear,
}

/// Maps "how long was the page hidden" to a [`CacheAction`].
///
/// ```text
///   0 ──── sweep_after ──── clear_after ────→ hidden for
///      Keep            Sweep            Clear
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityPolicy {
    /// Hidden longer than this → sweep. Default: 2 minutes.
    pub sweep_after: Duration,
    /// Hidden longer than this → clear. Default: 10 minutes.
    pub clear_after: Duration,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            sweep_after: Duration::from_secs(2 * 60),
            clear_after: Duration::from_secs(10 * 60),
        }
    }
}

impl VisibilityPolicy {
    /// Decides what to do after the page was hidden for `hidden_for`.
    pub fn action_for(&self, hidden_for: Duration) -> CacheAction {
        if hidden_for > self.clear_after {
            CacheAction::Clear
        } else if hidden_for > self.sweep_after {
            CacheAction::Sweep
        } else {
            CacheAction::Keep
        }
    }

    /// Forces `sweep_after <= clear_after`.
    pub fn validated(mut self) -> Self {
        if self.sweep_after > self.clear_after {
            self.sweep_after = self.clear_after;
        }
        self
    }
}
