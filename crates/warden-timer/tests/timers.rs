//! Integration tests for the scheduler and debouncer.
//!
//! Uses `start_paused = true` so tokio auto-advances the clock whenever
//! every task is idle; `sleep` in a test body therefore returns as soon as
//! simulated time reaches the deadline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use warden_timer::{Debouncer, Scheduler, TokioScheduler};

// =========================================================================
// Helpers
// =========================================================================

fn scheduler() -> Arc<dyn Scheduler> {
    Arc::new(TokioScheduler::new())
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let read = {
        let count = Arc::clone(&count);
        move || count.load(Ordering::SeqCst)
    };
    (count, read)
}

// =========================================================================
// Scheduler::schedule
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_fires_after_delay() {
    let s = scheduler();
    let (count, read) = counter();

    s.schedule(
        Duration::from_secs(2),
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );

    sleep(Duration::from_millis(1_900)).await;
    assert_eq!(read(), 0, "must not fire early");

    sleep(Duration::from_millis(200)).await;
    assert_eq!(read(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_timer_never_fires() {
    let s = scheduler();
    let (count, read) = counter();

    let handle = s.schedule(
        Duration::from_secs(1),
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    s.cancel(&handle);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(read(), 0);
    assert!(handle.is_cancelled());
}

// =========================================================================
// Scheduler::every
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_every_fires_once_per_period() {
    let s = scheduler();
    let (count, read) = counter();

    let handle = s.every(
        Duration::from_secs(180),
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );

    // First run is one full period after start, not immediately.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(read(), 0);

    sleep(Duration::from_secs(180 * 3)).await;
    assert_eq!(read(), 3);

    handle.cancel();
    sleep(Duration::from_secs(180 * 3)).await;
    assert_eq!(read(), 3, "no runs after cancel");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_every_timer() {
    let sched = TokioScheduler::new();
    let (count, read) = counter();
    let c1 = Arc::clone(&count);

    sched.schedule(
        Duration::from_secs(1),
        Box::new(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        }),
    );
    sched.every(
        Duration::from_secs(1),
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    sched.shutdown();

    sleep(Duration::from_secs(10)).await;
    assert_eq!(read(), 0);
    assert!(sched.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_scheduler_stops_its_timers() {
    let sched: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
    let (count, read) = counter();

    let handle = sched.every(
        Duration::from_secs(1),
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(read(), 2);

    drop(handle);
    drop(sched);
    sleep(Duration::from_secs(10)).await;

    assert_eq!(read(), 2);
}

// =========================================================================
// Debouncer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_debounce_three_calls_fire_once_with_latest_args() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let d = Debouncer::new(scheduler(), Duration::from_secs(2), move |n: u32| {
        sink.lock().unwrap().push(n);
    });

    d.call(1);
    sleep(Duration::from_millis(500)).await;
    d.call(2);
    sleep(Duration::from_millis(500)).await;
    d.call(3);
    assert!(d.is_pending());

    sleep(Duration::from_secs(3)).await;

    assert_eq!(*seen.lock().unwrap(), vec![3]);
    assert!(!d.is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_debounce_each_call_restarts_delay() {
    let (count, read) = counter();
    let d = Debouncer::new(scheduler(), Duration::from_secs(2), move |()| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    d.call(());
    sleep(Duration::from_millis(1_500)).await;
    d.call(());
    sleep(Duration::from_millis(1_500)).await;

    // 3s after the first call but only 1.5s after the second.
    assert_eq!(read(), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(read(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_calls_spaced_beyond_delay_fire_separately() {
    let (count, read) = counter();
    let d = Debouncer::new(scheduler(), Duration::from_secs(1), move |()| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    d.call(());
    sleep(Duration::from_secs(2)).await;
    d.call(());
    sleep(Duration::from_secs(2)).await;

    assert_eq!(read(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_cleanup_drops_pending_call() {
    let (count, read) = counter();
    let d = Debouncer::new(scheduler(), Duration::from_secs(2), move |()| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    d.call(());
    d.cleanup();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(read(), 0);
    assert!(!d.is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_debounce_flush_fires_immediately_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let d = Debouncer::new(scheduler(), Duration::from_secs(2), move |s: &'static str| {
        sink.lock().unwrap().push(s);
    });

    d.call("a");
    d.call("b");
    d.flush();
    assert_eq!(*seen.lock().unwrap(), vec!["b"]);

    // The cancelled timer must not deliver a second invocation.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_clones_share_pending_call() {
    let (count, read) = counter();
    let d = Debouncer::new(scheduler(), Duration::from_secs(1), move |()| {
        count.fetch_add(1, Ordering::SeqCst);
    });
    let d2 = d.clone();

    d.call(());
    d2.call(());
    sleep(Duration::from_secs(2)).await;

    assert_eq!(read(), 1);
}
