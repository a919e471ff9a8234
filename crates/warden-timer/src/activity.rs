//! Activity signal capture.
//!
//! The tracker only records WHEN the user last did something. Whether that
//! is long enough ago to sign the user out is the session controller's
//! decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Records a monotonic "last activity signal" timestamp.
///
/// Lock-free: interaction listeners may fire on every click or key press,
/// so a signal is a single atomic store. Timestamps are kept as
/// milliseconds since the tracker was created.
#[derive(Debug)]
pub struct ActivityTracker {
    origin: Instant,
    last_signal_ms: AtomicU64,
    signals: AtomicU64,
}

impl ActivityTracker {
    /// Creates a tracker. Creation counts as the first signal.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_signal_ms: AtomicU64::new(0),
            signals: AtomicU64::new(0),
        }
    }

    /// Records an activity signal now.
    pub fn on_signal(&self) {
        let now_ms = self.origin.elapsed().as_millis() as u64;
        // `fetch_max` keeps the timestamp monotonic even if two signals
        // race and store out of order.
        self.last_signal_ms.fetch_max(now_ms, Ordering::Relaxed);
        self.signals.fetch_add(1, Ordering::Relaxed);
    }

    /// When the last signal was recorded.
    pub fn last_signal_at(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_signal_ms.load(Ordering::Relaxed))
    }

    /// Time since the last signal.
    pub fn idle_for(&self) -> Duration {
        self.last_signal_at().elapsed()
    }

    /// Number of signals recorded since creation.
    pub fn signal_count(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}
