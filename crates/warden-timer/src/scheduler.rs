//! The scheduler abstraction and its tokio implementation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Work to run once when a timer fires.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Work to run on every period of a repeating timer.
pub type RepeatingAction = Box<dyn FnMut() + Send + 'static>;

/// Counter for generating unique timer IDs.
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// TimerHandle
// ---------------------------------------------------------------------------

/// Opaque identifier for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Handle to a scheduled timer.
///
/// Dropping the handle does NOT cancel the timer; call
/// [`cancel`](Self::cancel) (or [`Scheduler::cancel`]) for that. Cloning
/// is cheap and every clone controls the same timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: TimerId,
    token: CancellationToken,
}

impl TimerHandle {
    /// Creates a handle for a scheduler implementation.
    ///
    /// The scheduler must stop the timer's work once `token` is cancelled.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            id: TimerId::next(),
            token,
        }
    }

    /// This timer's identifier.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Stops the timer. A one-shot timer that has not fired yet never
    /// will; a repeating timer stops after its current run. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            trace!(timer = %self.id, "timer cancelled");
            self.token.cancel();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called (directly or via
    /// scheduler shutdown).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// Scheduler trait
// ---------------------------------------------------------------------------

/// Schedules delayed and periodic work.
///
/// Object safe, so components hold an `Arc<dyn Scheduler>` and tests can
/// swap in their own implementation.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `action` once after `delay`.
    fn schedule(&self, delay: Duration, action: Action) -> TimerHandle;

    /// Runs `action` every `period`, first after one full period.
    fn every(&self, period: Duration, action: RepeatingAction) -> TimerHandle;

    /// Cancels a timer created by this scheduler.
    fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

/// [`Scheduler`] backed by the tokio timer wheel.
///
/// Each timer is a lightweight spawned task racing a sleep against its
/// cancellation token. Dropping the scheduler cancels every timer it
/// created. Requires a running tokio runtime. Under
/// `tokio::time::pause()` timers fire as the test advances the clock.
#[derive(Debug)]
pub struct TokioScheduler {
    /// Parent of every timer token; cancelling it stops all timers.
    root: CancellationToken,
    /// Upper bound of random delay added to the first run of a repeating
    /// timer, so tabs opened at the same instant don't poll in lockstep.
    max_initial_jitter: Duration,
}

impl TokioScheduler {
    /// Creates a scheduler without initial jitter.
    pub fn new() -> Self {
        Self::with_initial_jitter(Duration::ZERO)
    }

    /// Creates a scheduler that delays the first run of each repeating
    /// timer by a random amount in `0..max`.
    pub fn with_initial_jitter(max: Duration) -> Self {
        Self {
            root: CancellationToken::new(),
            max_initial_jitter: max,
        }
    }

    /// Cancels every timer created by this scheduler, including ones
    /// created after this call. Used on page unload.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            debug!("scheduler shut down, all timers cancelled");
            self.root.cancel();
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_initial_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokioScheduler {
    /// Timers never outlive the last owner of their scheduler.
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: Action) -> TimerHandle {
        let token = self.root.child_token();
        let handle = TimerHandle::new(token.clone());
        let id = handle.id();
        // Deadline is fixed at scheduling time, not when the task is first polled.
        let deadline = Instant::now() + delay;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = time::sleep_until(deadline) => {
                    trace!(timer = %id, "timer fired");
                    action();
                }
            }
        });

        handle
    }

    fn every(&self, period: Duration, mut action: RepeatingAction) -> TimerHandle {
        let token = self.root.child_token();
        let handle = TimerHandle::new(token.clone());
        let id = handle.id();
        let start = Instant::now() + period + self.jitter();

        tokio::spawn(async move {
            let mut interval = time::interval_at(start, period);
            // A tab that slept through several periods gets one run on
            // wake-up, not a burst of catch-up runs.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        trace!(timer = %id, "periodic timer fired");
                        action();
                    }
                }
            }
        });

        debug!(timer = %id, period_ms = period.as_millis() as u64, "periodic timer started");
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_ids_are_unique() {
        let a = TimerHandle::new(CancellationToken::new());
        let b = TimerHandle::new(CancellationToken::new());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_cancel_is_idempotent_and_shared_by_clones() {
        let handle = TimerHandle::new(CancellationToken::new());
        let clone = handle.clone();

        handle.cancel();
        handle.cancel();

        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_zero_jitter_is_zero() {
        let s = TokioScheduler::new();
        assert_eq!(s.jitter(), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_below_max() {
        let s = TokioScheduler::with_initial_jitter(Duration::from_millis(10));
        for _ in 0..100 {
            assert!(s.jitter() < Duration::from_millis(10));
        }
    }
}
