//! Trailing-edge debouncing with "coalesce to latest" semantics.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::{Scheduler, TimerHandle};

struct DebounceState<A> {
    /// Arguments of the most recent call, waiting for the timer.
    latest: Option<A>,
    /// Timer for the pending invocation, if any.
    pending: Option<TimerHandle>,
    /// Bumped on every call/cleanup. A timer that wakes up with a stale
    /// generation lost a race with a newer call and must do nothing.
    generation: u64,
}

struct DebounceInner<A> {
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    f: Box<dyn Fn(A) + Send + Sync>,
    state: Mutex<DebounceState<A>>,
}

impl<A> DebounceInner<A> {
    fn lock(&self) -> MutexGuard<'_, DebounceState<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collapses a burst of calls into one delayed invocation.
///
/// Every [`call`](Self::call) restarts the delay and replaces the stored
/// arguments, so a burst of calls closer together than `delay` produces
/// exactly one invocation of `f`, with the arguments of the last call.
///
/// Cheap to clone; clones share the same pending invocation.
pub struct Debouncer<A: Send + 'static> {
    inner: Arc<DebounceInner<A>>,
}

impl<A: Send + 'static> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Debouncer<A> {
    /// Creates a debouncer that invokes `f` once calls have been quiet for
    /// `delay`.
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, delay: Duration, f: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DebounceInner {
                delay,
                scheduler,
                f: Box::new(f),
                state: Mutex::new(DebounceState {
                    latest: None,
                    pending: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Records a call. Cancels any pending invocation and schedules a new
    /// one `delay` from now with `args`.
    pub fn call(&self, args: A) {
        let mut state = self.inner.lock();
        state.latest = Some(args);
        state.generation += 1;
        if let Some(previous) = state.pending.take() {
            previous.cancel();
        }

        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        let handle = self.inner.scheduler.schedule(
            self.inner.delay,
            Box::new(move || fire(&inner, generation)),
        );
        state.pending = Some(handle);
        trace!(generation, "debounced call recorded");
    }

    /// Runs a pending invocation right away instead of waiting for the
    /// delay. Does nothing if nothing is pending.
    pub fn flush(&self) {
        let args = {
            let mut state = self.inner.lock();
            state.generation += 1;
            if let Some(handle) = state.pending.take() {
                handle.cancel();
            }
            state.latest.take()
        };
        if let Some(args) = args {
            (self.inner.f)(args);
        }
    }

    /// Cancels any pending invocation and forgets the stored arguments.
    pub fn cleanup(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.latest = None;
        if let Some(handle) = state.pending.take() {
            handle.cancel();
        }
    }

    /// Whether an invocation is waiting for its delay to elapse.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// The configured quiet period.
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

fn fire<A>(inner: &DebounceInner<A>, generation: u64) {
    let args = {
        let mut state = inner.lock();
        if state.generation != generation {
            return;
        }
        state.pending = None;
        state.latest.take()
    };
    // Invoke outside the lock so `f` may call back into the debouncer.
    if let Some(args) = args {
        (inner.f)(args);
    }
}
