//! `Warden` builder and presence routing.
//!
//! This is the entry point a host embeds. It owns the shared cache,
//! request coordinator and scheduler, wires them into the session
//! controller, and turns raw presence signals from the platform into
//! controller calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use warden_cache::TtlCache;
use warden_protocol::{AuthEvent, PresenceSignal};
use warden_request::RequestCoordinator;
use warden_session::{SessionController, SessionService, SessionState, Storage};
use warden_timer::{ActivityTracker, Scheduler, TimerHandle, TokioScheduler};

use crate::{MemoryAwareFetch, WardenConfig};

/// Page presence as last reported by the host.
#[derive(Debug)]
struct Presence {
    hidden_since: Option<Instant>,
    online: bool,
}

/// Builder for configuring and starting a [`Warden`].
///
/// # Example
///
/// ```rust,ignore
/// use warden::prelude::*;
///
/// let warden = Warden::builder(my_service)
///     .config(WardenConfig::from_json(&text)?)
///     .storage(Storage::new(my_backend))
///     .build()
///     .await;
/// warden.handle_presence(PresenceSignal::Visible).await;
/// ```
pub struct WardenBuilder<S: SessionService> {
    service: S,
    config: WardenConfig,
    storage: Option<Storage>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<S: SessionService> WardenBuilder<S> {
    /// Creates a builder with default settings and in-memory storage.
    pub fn new(service: S) -> Self {
        Self {
            service,
            config: WardenConfig::default(),
            storage: None,
            scheduler: None,
        }
    }

    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    /// Where the credential is persisted between page loads.
    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replaces the tokio-backed scheduler.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Wires everything together, starts the background sweep, and resumes
    /// the persisted session if there is one.
    pub async fn build(self) -> Warden<S> {
        let config = self.config.validated();
        let scheduler = self.scheduler.unwrap_or_else(|| {
            let scheduler = if config.timer_jitter.is_zero() {
                TokioScheduler::new()
            } else {
                TokioScheduler::with_initial_jitter(config.timer_jitter)
            };
            Arc::new(scheduler) as Arc<dyn Scheduler>
        });
        let cache = Arc::new(TtlCache::new(config.cache.clone()));
        let requests = Arc::new(RequestCoordinator::new());
        let tracker = Arc::new(ActivityTracker::new());

        let controller = SessionController::builder(self.service)
            .config(config.session.clone())
            .storage(self.storage.unwrap_or_else(Storage::in_memory))
            .cache(Arc::clone(&cache))
            .requests(Arc::clone(&requests))
            .scheduler(Arc::clone(&scheduler))
            .activity(tracker)
            .build();

        let sweep = {
            let cache = Arc::clone(&cache);
            scheduler.every(
                config.cache.sweep_interval,
                Box::new(move || {
                    cache.sweep();
                }),
            )
        };

        let warden = Warden {
            controller,
            fetch: MemoryAwareFetch::new(Arc::clone(&cache), Arc::clone(&requests)),
            cache,
            requests,
            scheduler,
            sweep,
            presence: Mutex::new(Presence {
                hidden_since: None,
                online: true,
            }),
            events: CancellationToken::new(),
            destroyed: AtomicBool::new(false),
        };

        let state = warden.controller.restore().await;
        info!(%state, "warden started");
        warden
    }
}

/// A running session lifecycle core.
///
/// Hosts forward platform signals to [`handle_presence`](Self::handle_presence)
/// and service auth events through
/// [`attach_auth_events`](Self::attach_auth_events); everything else happens
/// on timers. Call [`destroy`](Self::destroy) when the page goes away.
pub struct Warden<S: SessionService> {
    controller: SessionController<S>,
    fetch: MemoryAwareFetch,
    cache: Arc<TtlCache<Value>>,
    requests: Arc<RequestCoordinator>,
    scheduler: Arc<dyn Scheduler>,
    sweep: TimerHandle,
    presence: Mutex<Presence>,
    events: CancellationToken,
    destroyed: AtomicBool,
}

impl<S: SessionService> Warden<S> {
    /// Creates a new builder.
    pub fn builder(service: S) -> WardenBuilder<S> {
        WardenBuilder::new(service)
    }

    pub fn controller(&self) -> &SessionController<S> {
        &self.controller
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    /// Fetch wrapper bound to the shared cache and coordinator.
    pub fn fetch(&self) -> &MemoryAwareFetch {
        &self.fetch
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    pub fn requests(&self) -> &Arc<RequestCoordinator> {
        &self.requests
    }

    /// Whether the host last reported the page as hidden.
    pub fn is_hidden(&self) -> bool {
        self.presence().hidden_since.is_some()
    }

    /// Whether the host last reported the network as reachable.
    pub fn is_online(&self) -> bool {
        self.presence().online
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // -- Presence -----------------------------------------------------------

    /// Routes one platform signal.
    ///
    /// Signals arriving after [`destroy`](Self::destroy) are ignored.
    pub async fn handle_presence(&self, signal: PresenceSignal) {
        if self.is_destroyed() {
            trace!(?signal, "presence signal after destroy ignored");
            return;
        }

        match signal {
            PresenceSignal::Hidden => {
                self.presence().hidden_since.get_or_insert_with(Instant::now);
                trace!("page hidden");
            }
            PresenceSignal::Visible => {
                let hidden_since = self.presence().hidden_since.take();
                if let Some(since) = hidden_since {
                    self.on_visible(since.elapsed()).await;
                }
            }
            PresenceSignal::Online => {
                self.presence().online = true;
                self.controller.on_reconnect().await;
            }
            PresenceSignal::Offline => {
                self.presence().online = false;
                debug!("network offline");
            }
            PresenceSignal::Unload => self.destroy().await,
            PresenceSignal::Interaction(kind) => {
                trace!(?kind, "interaction");
                self.controller.record_activity().await;
            }
        }
    }

    async fn on_visible(&self, hidden_for: Duration) {
        let action = self.cache.config().visibility.action_for(hidden_for);
        debug!(hidden_secs = hidden_for.as_secs(), ?action, "page visible");
        self.cache.apply(action);
        self.controller.on_visible(hidden_for).await;
    }

    // -- Auth events --------------------------------------------------------

    /// Feeds auth events from the service into the controller until the
    /// sender is dropped or the runtime is destroyed.
    pub fn attach_auth_events(&self, mut events: mpsc::Receiver<AuthEvent>) {
        let controller = self.controller.clone();
        let stop = self.events.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => controller.handle_auth_event(event).await,
                        None => break,
                    },
                }
            }
            debug!("auth event stream detached");
        });
    }

    // -- Teardown -----------------------------------------------------------

    /// Drops expired cache entries and cancels every in-flight request.
    pub fn cleanup(&self) {
        let swept = self.cache.sweep();
        let cancelled = self.requests.cancel_all();
        debug!(swept, cancelled, "cleanup");
    }

    /// Stops all timers, cancels all requests, and empties the cache. The
    /// session state and persisted credential are left as they are, so
    /// the next page load can restore them. Idempotent.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.cancel(&self.sweep);
        self.events.cancel();
        self.controller.shutdown().await;
        self.cache.clear();
        info!("warden destroyed");
    }

    fn presence(&self) -> MutexGuard<'_, Presence> {
        self.presence.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: SessionService> Drop for Warden<S> {
    fn drop(&mut self) {
        self.sweep.cancel();
        self.events.cancel();
    }
}
