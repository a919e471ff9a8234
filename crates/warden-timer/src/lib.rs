//! Timer scheduling, debouncing, and activity tracking for Warden.
//!
//! The session controller never calls platform timer APIs directly. Every
//! timing decision goes through the [`Scheduler`] trait, which makes the
//! decisions data (a delay plus an action) and lets tests drive them with
//! tokio's paused clock.
//!
//! - [`Scheduler`] / [`TokioScheduler`]: one-shot and periodic timers
//! - [`Debouncer`]: collapse bursts of calls into one, keeping the latest
//!   arguments
//! - [`ActivityTracker`]: a monotonic "last user signal" timestamp
//!
//! # Integration
//!
//! ```ignore
//! let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
//! let validate = Debouncer::new(scheduler.clone(), Duration::from_secs(2), move |()| {
//!     let controller = controller.clone();
//!     tokio::spawn(async move { controller.validate_now().await });
//! });
//! let tick = scheduler.every(Duration::from_secs(180), Box::new(move || validate.call(())));
//! ```

mod activity;
mod debounce;
mod scheduler;

pub use activity::ActivityTracker;
pub use debounce::Debouncer;
pub use scheduler::{Action, RepeatingAction, Scheduler, TimerHandle, TimerId, TokioScheduler};
