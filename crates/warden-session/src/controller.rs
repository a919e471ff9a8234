//! The session controller: owns the session and every policy around it.
//!
//! # Locking
//!
//! All mutable state lives in one `tokio::sync::Mutex<Core>`. Every handler
//! takes the lock, runs its synchronous part to completion and releases
//! the lock *before* awaiting the service. When the answer arrives the
//! handler locks again and checks the session `epoch`: a result for a
//! session that was replaced or terminated in the meantime is dropped.
//!
//! # Triggers
//!
//! ```text
//! periodic timer ──┐
//! visible / online ─┼─(grace delay)─┐
//! activity burst ──┘                ├──→ debouncer ──→ validate_now()
//!                                   │
//! start / restore ──────────────────┴──────────────→ validate_now() (direct)
//! ```

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use warden_cache::{CacheConfig, TtlCache};
use warden_protocol::{
    AuthEvent, Lifetime, Notice, ServiceSession, StoredCredential, UserId, UserProfile, unix_now,
};
use warden_request::{RequestCoordinator, RequestOutcome};
use warden_timer::{Action, ActivityTracker, Debouncer, Scheduler, TimerHandle, TokioScheduler};

use crate::{
    ActivityState, ServiceError, Session, SessionConfig, SessionService, SessionState,
    SessionStatus, Storage, TerminationReason,
};

/// Coordinator key of the "get current session" call.
pub const VALIDATE_REQUEST: &str = "session:validate";
/// Coordinator key of the refresh call.
pub const REFRESH_REQUEST: &str = "session:refresh";
/// Coordinator key of the remote sign-out call.
pub const SIGN_OUT_REQUEST: &str = "session:sign-out";

const NOTICE_CAPACITY: usize = 16;

/// Cache (and coordinator) key of a user's profile.
pub fn profile_cache_key(user: &UserId) -> String {
    format!("user-profile-{user}")
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Timers {
    periodic: Option<TimerHandle>,
    grace: Option<TimerHandle>,
    inactivity: Option<TimerHandle>,
    idle_warning: Option<TimerHandle>,
}

impl Timers {
    fn cancel_inactivity(&mut self, scheduler: &dyn Scheduler) {
        for handle in [self.inactivity.take(), self.idle_warning.take()]
            .into_iter()
            .flatten()
        {
            scheduler.cancel(&handle);
        }
    }

    fn cancel_all(&mut self, scheduler: &dyn Scheduler) {
        self.cancel_inactivity(scheduler);
        for handle in [self.periodic.take(), self.grace.take()]
            .into_iter()
            .flatten()
        {
            scheduler.cancel(&handle);
        }
    }
}

struct Core {
    state: SessionState,
    session: Option<Session>,
    activity: ActivityState,
    profile: Option<UserProfile>,
    reason: Option<TerminationReason>,
    /// Set while a validation (and its refresh) is in flight. Triggers that
    /// arrive meanwhile are dropped, not queued.
    is_validating: bool,
    /// Bumped whenever the session is replaced or terminated.
    epoch: u64,
    timers: Timers,
}

/// What a validation needs to remember across the network call.
struct ValidationPass {
    token: String,
    epoch: u64,
    /// State to go back to when the check is inconclusive.
    prior: SessionState,
}

enum AfterValidation {
    Done(Option<TerminationReason>),
    Refresh(String),
}

struct Shared<S> {
    config: SessionConfig,
    service: S,
    storage: Storage,
    cache: Arc<TtlCache<Value>>,
    requests: Arc<RequestCoordinator>,
    scheduler: Arc<dyn Scheduler>,
    tracker: Arc<ActivityTracker>,
    validation: Debouncer<()>,
    core: Mutex<Core>,
    status: watch::Sender<SessionStatus>,
    notices: broadcast::Sender<Notice>,
}

impl<S> Drop for Shared<S> {
    /// The periodic timer owns a debouncer clone, which owns the scheduler;
    /// cancel it here or neither is ever released.
    fn drop(&mut self) {
        self.core.get_mut().timers.cancel_all(&*self.scheduler);
        self.validation.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`SessionController`].
///
/// Only the service is required. Collaborators that are not supplied are
/// created fresh; pass the runtime's shared instances so the controller's
/// teardown reaches them.
pub struct SessionControllerBuilder<S> {
    service: S,
    config: SessionConfig,
    storage: Option<Storage>,
    cache: Option<Arc<TtlCache<Value>>>,
    requests: Option<Arc<RequestCoordinator>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    tracker: Option<Arc<ActivityTracker>>,
}

impl<S: SessionService> SessionControllerBuilder<S> {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn cache(mut self, cache: Arc<TtlCache<Value>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn requests(mut self, requests: Arc<RequestCoordinator>) -> Self {
        self.requests = Some(requests);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn activity(mut self, tracker: Arc<ActivityTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Builds the controller in the `Unauthenticated` state. No timers run
    /// until a session is started.
    pub fn build(self) -> SessionController<S> {
        let config = self.config.validated();
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::new()) as Arc<dyn Scheduler>);
        let debounce = config.validation_debounce;
        let (status, _) = watch::channel(SessionStatus::unauthenticated());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<S>>| {
            let weak = weak.clone();
            let validation = Debouncer::new(Arc::clone(&scheduler), debounce, move |()| {
                if let Some(shared) = weak.upgrade() {
                    let controller = SessionController { shared };
                    tokio::spawn(async move { controller.validate_now().await });
                }
            });

            Shared {
                config,
                service: self.service,
                storage: self.storage.unwrap_or_else(Storage::in_memory),
                cache: self
                    .cache
                    .unwrap_or_else(|| Arc::new(TtlCache::new(CacheConfig::default()))),
                requests: self.requests.unwrap_or_default(),
                scheduler,
                tracker: self.tracker.unwrap_or_default(),
                validation,
                core: Mutex::new(Core {
                    state: SessionState::Unauthenticated,
                    session: None,
                    activity: ActivityState::new(),
                    profile: None,
                    reason: None,
                    is_validating: false,
                    epoch: 0,
                    timers: Timers::default(),
                }),
                status,
                notices,
            }
        });

        SessionController { shared }
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Keeps one client session valid, and ends it when policy says so.
///
/// Cheap to clone; clones drive the same session.
pub struct SessionController<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for SessionController<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: SessionService> SessionController<S> {
    /// Starts building a controller around `service`.
    pub fn builder(service: S) -> SessionControllerBuilder<S> {
        SessionControllerBuilder {
            service,
            config: SessionConfig::default(),
            storage: None,
            cache: None,
            requests: None,
            scheduler: None,
            tracker: None,
        }
    }

    async fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().await
    }

    // -- Observation --------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.status.borrow().state
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.shared.status.borrow().clone()
    }

    /// Watches status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Receives user-visible notices published from now on.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.shared.notices.subscribe()
    }

    /// The profile loaded for the current session, if any.
    pub async fn profile(&self) -> Option<UserProfile> {
        self.lock().await.profile.clone()
    }

    /// Auth errors counted toward the current budget.
    pub async fn auth_error_count(&self) -> u32 {
        self.lock().await.activity.consecutive_auth_errors
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.shared.cache
    }

    pub fn requests(&self) -> &Arc<RequestCoordinator> {
        &self.shared.requests
    }

    /// Time since the last interaction, or since the controller was built
    /// when there has been none. Unlike the inactivity timer, this counts
    /// every signal, including ones inside the reset granularity.
    pub fn idle_for(&self) -> Duration {
        self.shared.tracker.idle_for()
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.shared.tracker
    }

    pub fn service(&self) -> &S {
        &self.shared.service
    }

    // -- Sign-in ------------------------------------------------------------

    /// Installs `credential` and validates it right away. Returns the state
    /// the session ended up in.
    ///
    /// The credential is presumed valid until the service says otherwise,
    /// so an unreachable service leaves the session `Authenticated`.
    pub async fn start(&self, credential: StoredCredential) -> SessionState {
        if credential.access_token.trim().is_empty() {
            warn!(user = %credential.user, "refusing to start a session without a token");
            return self.state();
        }

        let pass = {
            let mut core = self.lock().await;
            let session = Session::from_credential(credential);
            let token = session.token.clone();
            self.install(&mut core, session, SessionState::Validating);
            core.is_validating = true;
            ValidationPass {
                token,
                epoch: core.epoch,
                prior: SessionState::Authenticated,
            }
        };

        self.run_validation(pass).await;
        if self.state() == SessionState::Authenticated {
            self.load_profile().await;
        }
        self.state()
    }

    /// Resumes the session persisted in storage, if there is one.
    pub async fn restore(&self) -> SessionState {
        match self.shared.storage.load_credential() {
            Some(credential) => {
                info!(user = %credential.user, "restoring persisted session");
                self.start(credential).await
            }
            None => {
                debug!("no persisted session to restore");
                self.state()
            }
        }
    }

    /// Applies an auth state change pushed by the service.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(remote) => self.on_remote_credential(remote, true).await,
            AuthEvent::TokenRefreshed(remote) => self.on_remote_credential(remote, false).await,
            AuthEvent::SignedOut => {
                let mut core = self.lock().await;
                if core.state.is_live() {
                    info!("service reports sign-out from elsewhere");
                    self.terminate(&mut core, TerminationReason::RemoteSignOut);
                } else {
                    trace!(state = %core.state, "sign-out event without a live session");
                }
            }
        }
    }

    /// A credential pushed by the service. Only a sign-in may replace the
    /// session or leave `Unauthenticated`/`Terminated`; a refresh applies to
    /// the live session of the same user or is dropped.
    async fn on_remote_credential(&self, remote: ServiceSession, signed_in: bool) {
        let fresh = {
            let mut core = self.lock().await;
            let same_user = core.state.is_live()
                && core
                    .session
                    .as_ref()
                    .is_some_and(|session| session.user == remote.user);

            if same_user {
                debug!(user = %remote.user, "credential updated by the service");
                if core.is_validating {
                    self.absorb(&mut core, remote);
                    core.activity.reset_errors();
                } else {
                    self.mark_validated(&mut core, remote);
                }
                false
            } else if !signed_in {
                debug!(
                    user = %remote.user,
                    state = %core.state,
                    "token refresh without a matching live session ignored"
                );
                return;
            } else {
                info!(user = %remote.user, "signed in");
                self.install(
                    &mut core,
                    Session::from_service(remote),
                    SessionState::Authenticated,
                );
                true
            }
        };
        if fresh {
            self.load_profile().await;
        }
    }

    // -- Validation ---------------------------------------------------------

    /// Checks the session with the service now.
    ///
    /// No-op without a live session, or while another validation is in
    /// flight.
    pub async fn validate_now(&self) {
        let pass = {
            let mut core = self.lock().await;
            if core.is_validating {
                debug!("validation already in flight, trigger dropped");
                return;
            }
            if !core.state.is_live() {
                return;
            }
            let Some(token) = core.session.as_ref().map(|s| s.token.clone()) else {
                return;
            };

            let prior = if core.state.is_checking() {
                SessionState::Authenticated
            } else {
                core.state
            };
            core.is_validating = true;
            self.transition(&mut core, SessionState::Validating);
            ValidationPass {
                token,
                epoch: core.epoch,
                prior,
            }
        };

        self.run_validation(pass).await;
    }

    /// Asks for a validation through the debouncer, so bursts of triggers
    /// end up as one call.
    pub fn request_validation(&self) {
        self.shared.validation.call(());
    }

    async fn run_validation(&self, pass: ValidationPass) {
        let shared = &self.shared;
        let outcome = shared
            .requests
            .run(VALIDATE_REQUEST, |_cancel| {
                shared.service.get_current_session(&pass.token)
            })
            .await;

        let next = {
            let mut core = self.lock().await;
            if core.epoch != pass.epoch {
                debug!("validation result for a replaced session ignored");
                return;
            }

            let next = match outcome {
                RequestOutcome::Cancelled => {
                    debug!("validation cancelled");
                    self.transition(&mut core, pass.prior);
                    AfterValidation::Done(None)
                }
                RequestOutcome::Completed(Ok(None)) => {
                    info!("service has no session for this credential");
                    AfterValidation::Done(self.end(&mut core, TerminationReason::SessionExpired))
                }
                RequestOutcome::Completed(Ok(Some(remote))) => {
                    match remote.lifetime_at(unix_now()) {
                        Lifetime::Expired => {
                            info!(user = %remote.user, "session already past expiry");
                            AfterValidation::Done(
                                self.end(&mut core, TerminationReason::SessionExpired),
                            )
                        }
                        Lifetime::Remaining(left) if left < shared.config.refresh_threshold => {
                            debug!(
                                remaining_secs = left.as_secs(),
                                "session close to expiry, refreshing"
                            );
                            let token = remote.access_token.clone();
                            self.absorb(&mut core, remote);
                            self.transition(&mut core, SessionState::Refreshing);
                            AfterValidation::Refresh(token)
                        }
                        _ => {
                            self.mark_validated(&mut core, remote);
                            AfterValidation::Done(None)
                        }
                    }
                }
                RequestOutcome::Completed(Err(e)) => {
                    AfterValidation::Done(self.on_validation_error(&mut core, e, pass.prior))
                }
            };

            if matches!(next, AfterValidation::Done(_)) {
                core.is_validating = false;
            }
            next
        };

        match next {
            AfterValidation::Done(Some(reason)) => self.notify_service_of_sign_out(reason).await,
            AfterValidation::Done(None) => {}
            AfterValidation::Refresh(token) => self.run_refresh(pass, token).await,
        }
    }

    async fn run_refresh(&self, pass: ValidationPass, token: String) {
        let shared = &self.shared;
        let outcome = shared
            .requests
            .run(REFRESH_REQUEST, |_cancel| shared.service.refresh_session(&token))
            .await;

        let ended = {
            let mut core = self.lock().await;
            if core.epoch != pass.epoch {
                debug!("refresh result for a replaced session ignored");
                return;
            }
            core.is_validating = false;

            match outcome {
                RequestOutcome::Cancelled | RequestOutcome::Completed(Err(ServiceError::Aborted)) => {
                    debug!("refresh cancelled");
                    self.transition(&mut core, pass.prior);
                    None
                }
                RequestOutcome::Completed(Ok(())) => {
                    if let Some(session) = core.session.as_mut() {
                        session.last_validated_at = Instant::now();
                    }
                    core.activity.reset_errors();
                    self.transition(&mut core, SessionState::Authenticated);
                    info!("session refreshed");
                    None
                }
                RequestOutcome::Completed(Err(ServiceError::Network(msg)))
                    if shared.config.tolerate_network_errors =>
                {
                    warn!(error = %msg, "network error during refresh, will retry");
                    self.transition(&mut core, pass.prior);
                    None
                }
                RequestOutcome::Completed(Err(e)) => {
                    warn!(error = %e, "session refresh failed");
                    self.end(&mut core, TerminationReason::RefreshFailed)
                }
            }
        };

        if let Some(reason) = ended {
            self.notify_service_of_sign_out(reason).await;
        }
    }

    fn on_validation_error(
        &self,
        core: &mut Core,
        error: ServiceError,
        prior: SessionState,
    ) -> Option<TerminationReason> {
        match error {
            ServiceError::Aborted => {
                debug!("validation aborted");
            }
            ServiceError::Network(msg) if self.shared.config.tolerate_network_errors => {
                warn!(error = %msg, "network error during validation, will retry");
            }
            ServiceError::Auth(msg) => {
                warn!(error = %msg, "validation rejected the credential");
                if self.record_auth_error(core) {
                    return self.end(core, TerminationReason::AuthErrorBudget);
                }
            }
            other => {
                warn!(error = %other, "session validation failed");
                if self.validation_is_stale(core) {
                    info!("too long without a successful validation");
                    return self.end(core, TerminationReason::ValidationStale);
                }
            }
        }
        self.transition(core, prior);
        None
    }

    /// Counts an auth error. Returns whether the budget is exhausted.
    fn record_auth_error(&self, core: &mut Core) -> bool {
        let config = &self.shared.config;
        let now = Instant::now();
        let activity = &mut core.activity;

        if activity
            .last_error_at
            .is_some_and(|at| now.saturating_duration_since(at) > config.auth_error_window)
        {
            activity.consecutive_auth_errors = 0;
        }
        activity.consecutive_auth_errors += 1;
        activity.last_error_at = Some(now);

        warn!(
            count = activity.consecutive_auth_errors,
            threshold = config.auth_error_threshold,
            "authentication error counted"
        );
        activity.consecutive_auth_errors >= config.auth_error_threshold
    }

    fn validation_is_stale(&self, core: &Core) -> bool {
        match (self.shared.config.stale_validation_limit, core.session.as_ref()) {
            (Some(limit), Some(session)) => session.last_validated_at.elapsed() > limit,
            _ => false,
        }
    }

    /// Copies what the service reported into the held session, persisting
    /// the credential when it changed.
    fn absorb(&self, core: &mut Core, remote: ServiceSession) {
        let Some(session) = core.session.as_mut() else {
            return;
        };
        let changed =
            session.token != remote.access_token || session.expires_at != remote.expires_at;
        session.token = remote.access_token;
        session.expires_at = remote.expires_at;
        if changed {
            self.shared.storage.save_credential(&session.credential());
        }
    }

    fn mark_validated(&self, core: &mut Core, remote: ServiceSession) {
        self.absorb(core, remote);
        if let Some(session) = core.session.as_mut() {
            session.last_validated_at = Instant::now();
        }
        core.activity.reset_errors();
        self.transition(core, SessionState::Authenticated);
        debug!("session validated");
    }

    // -- Presence -----------------------------------------------------------

    /// Records user activity. Restarts the inactivity timer, at most once
    /// per reset granularity, and asks for a validation when it does.
    pub async fn record_activity(&self) {
        self.shared.tracker.on_signal();

        let mut core = self.lock().await;
        if !core.state.is_live() {
            return;
        }
        let since_reset = core.activity.last_activity_at.elapsed();
        if since_reset > self.shared.config.activity_reset_granularity {
            debug!(
                quiet_secs = since_reset.as_secs(),
                "activity after a quiet period, inactivity timer restarted"
            );
            self.reset_inactivity(&mut core);
            self.shared.validation.call(());
        }
    }

    /// The page became visible after being hidden for `hidden_for`.
    pub async fn on_visible(&self, hidden_for: Duration) {
        let mut core = self.lock().await;
        if !core.state.is_live() {
            return;
        }
        if hidden_for > self.shared.config.revalidate_after_hidden {
            debug!(
                hidden_secs = hidden_for.as_secs(),
                "visible after a long absence, revalidating"
            );
            self.schedule_grace_validation(&mut core);
        }
    }

    /// Network connectivity came back.
    pub async fn on_reconnect(&self) {
        let mut core = self.lock().await;
        if core.state.is_live() {
            debug!("back online, revalidating");
            self.schedule_grace_validation(&mut core);
        }
    }

    fn schedule_grace_validation(&self, core: &mut Core) {
        let scheduler = &self.shared.scheduler;
        if let Some(previous) = core.timers.grace.take() {
            scheduler.cancel(&previous);
        }
        let validation = self.shared.validation.clone();
        core.timers.grace = Some(scheduler.schedule(
            self.shared.config.grace_delay,
            Box::new(move || validation.call(())),
        ));
    }

    async fn on_inactivity_timeout(&self, epoch: u64) {
        let ended = {
            let mut core = self.lock().await;
            if core.epoch != epoch || !core.state.is_live() {
                return;
            }
            info!(
                idle_secs = self.shared.tracker.idle_for().as_secs(),
                since_reset_secs = core.activity.last_activity_at.elapsed().as_secs(),
                "no activity, signing out"
            );
            self.end(&mut core, TerminationReason::Inactivity)
        };
        if let Some(reason) = ended {
            self.notify_service_of_sign_out(reason).await;
        }
    }

    async fn on_idle_warning(&self, epoch: u64) {
        let mut core = self.lock().await;
        if core.epoch != epoch || !core.state.is_live() || core.activity.idle_warned {
            return;
        }
        core.activity.idle_warned = true;
        info!(
            idle_secs = self.shared.tracker.idle_for().as_secs(),
            "long idle session, warning user"
        );
        self.publish_notice(Notice::IdleWarning);
    }

    // -- Profile ------------------------------------------------------------

    /// Loads the profile of the signed-in user, from the cache when it has
    /// a fresh copy. Auth errors count toward the same budget as
    /// validation.
    pub async fn load_profile(&self) -> Option<UserProfile> {
        let (user, token, epoch) = {
            let core = self.lock().await;
            if !core.state.is_live() {
                return None;
            }
            let session = core.session.as_ref()?;
            (session.user.clone(), session.token.clone(), core.epoch)
        };
        let shared = &self.shared;
        let key = profile_cache_key(&user);

        if let Some(cached) = shared.cache.get(&key) {
            match serde_json::from_value::<UserProfile>(cached) {
                Ok(profile) => {
                    trace!(user = %user, "profile served from cache");
                    let mut core = self.lock().await;
                    if core.epoch == epoch {
                        core.profile = Some(profile.clone());
                    }
                    return Some(profile);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping unreadable cached profile");
                    shared.cache.delete(&key);
                }
            }
        }

        let outcome = shared
            .requests
            .run(key.clone(), |_cancel| shared.service.fetch_profile(&user, &token))
            .await;

        let (profile, ended) = {
            let mut core = self.lock().await;
            if core.epoch != epoch {
                return None;
            }
            match outcome {
                RequestOutcome::Cancelled | RequestOutcome::Completed(Err(ServiceError::Aborted)) => {
                    (None, None)
                }
                RequestOutcome::Completed(Ok(profile)) => {
                    core.activity.reset_errors();
                    if let Some(found) = &profile {
                        match serde_json::to_value(found) {
                            Ok(value) => shared.cache.set_with_ttl(key, value, shared.config.profile_ttl),
                            Err(e) => warn!(user = %user, error = %e, "profile not cacheable"),
                        }
                    }
                    core.profile = profile.clone();
                    (profile, None)
                }
                RequestOutcome::Completed(Err(ServiceError::Auth(msg))) => {
                    warn!(user = %user, error = %msg, "profile fetch rejected the credential");
                    let ended = if self.record_auth_error(&mut core) {
                        self.end(&mut core, TerminationReason::AuthErrorBudget)
                    } else {
                        None
                    };
                    (None, ended)
                }
                RequestOutcome::Completed(Err(e)) => {
                    warn!(user = %user, error = %e, "profile fetch failed");
                    (None, None)
                }
            }
        };

        if let Some(reason) = ended {
            self.notify_service_of_sign_out(reason).await;
        }
        profile
    }

    // -- Sign-out and teardown ----------------------------------------------

    /// Signs the user out.
    ///
    /// Local teardown happens first and always: requests cancelled, cache
    /// cleared, persisted credential removed, state `Terminated`. The
    /// service is told afterwards; if that fails the user stays signed out
    /// locally.
    pub async fn sign_out(&self) {
        {
            let mut core = self.lock().await;
            if !self.terminate(&mut core, TerminationReason::SignedOut) {
                self.teardown(&mut core);
            }
        }
        self.notify_service_of_sign_out(TerminationReason::SignedOut)
            .await;
    }

    /// Stops all timers and cancels in-flight requests without touching
    /// the session state. Used when the page is unloaded.
    pub async fn shutdown(&self) {
        let mut core = self.lock().await;
        core.timers.cancel_all(&*self.shared.scheduler);
        self.shared.validation.cleanup();
        let cancelled = self.shared.requests.cancel_all();
        info!(cancelled, state = %core.state, "session controller shut down");
    }

    async fn notify_service_of_sign_out(&self, reason: TerminationReason) {
        if !reason.notifies_service() {
            return;
        }
        let shared = &self.shared;
        match shared
            .requests
            .run(SIGN_OUT_REQUEST, |_cancel| shared.service.sign_out())
            .await
        {
            RequestOutcome::Completed(Ok(())) => debug!("service sign-out complete"),
            RequestOutcome::Completed(Err(e)) => {
                warn!(error = %e, "service sign-out failed, local session already cleared");
            }
            RequestOutcome::Cancelled => debug!("service sign-out cancelled"),
        }
    }

    /// [`terminate`](Self::terminate), returning the reason when it took
    /// effect so the caller can tell the service after unlocking.
    fn end(&self, core: &mut Core, reason: TerminationReason) -> Option<TerminationReason> {
        self.terminate(core, reason).then_some(reason)
    }

    /// Moves to `Terminated` and tears everything down. Returns `false`,
    /// doing nothing, when the session is already terminated.
    fn terminate(&self, core: &mut Core, reason: TerminationReason) -> bool {
        if core.state == SessionState::Terminated {
            return false;
        }
        let user = core.session.take().map(|session| session.user);
        core.epoch += 1;
        core.is_validating = false;
        core.reason = Some(reason);
        core.profile = None;
        core.activity.reset_errors();
        self.teardown(core);
        self.transition(core, SessionState::Terminated);

        info!(user = ?user.as_ref().map(UserId::as_str), reason = %reason, "session terminated");
        if let Some(notice) = reason.notice() {
            self.publish_notice(notice);
        }
        true
    }

    fn teardown(&self, core: &mut Core) {
        let shared = &self.shared;
        core.timers.cancel_all(&*shared.scheduler);
        shared.validation.cleanup();
        let cancelled = shared.requests.cancel_all();
        shared.cache.clear();
        shared.storage.clear_credential();
        debug!(cancelled, "session resources released");
    }

    // -- Helpers ------------------------------------------------------------

    fn install(&self, core: &mut Core, session: Session, state: SessionState) {
        let shared = &self.shared;
        core.epoch += 1;
        shared.requests.cancel(VALIDATE_REQUEST);
        shared.requests.cancel(REFRESH_REQUEST);
        // A sign-out still in flight for the previous session must not
        // reach the service after this one is installed.
        shared.requests.cancel(SIGN_OUT_REQUEST);
        core.is_validating = false;
        core.activity = ActivityState::new();
        core.reason = None;
        core.profile = None;
        shared.storage.save_credential(&session.credential());
        core.session = Some(session);

        self.transition(core, state);
        self.publish(core);
        self.start_timers(core);
    }

    fn start_timers(&self, core: &mut Core) {
        let shared = &self.shared;
        core.timers.cancel_all(&*shared.scheduler);

        let validation = shared.validation.clone();
        core.timers.periodic = Some(shared.scheduler.every(
            shared.config.validation_interval,
            Box::new(move || validation.call(())),
        ));
        self.reset_inactivity(core);
    }

    fn reset_inactivity(&self, core: &mut Core) {
        let shared = &self.shared;
        core.timers.cancel_inactivity(&*shared.scheduler);
        core.activity.last_activity_at = Instant::now();
        core.activity.idle_warned = false;

        let epoch = core.epoch;
        core.timers.inactivity = Some(shared.scheduler.schedule(
            shared.config.inactivity_timeout,
            self.deferred(move |c| async move { c.on_inactivity_timeout(epoch).await }),
        ));
        if let Some(after) = shared.config.idle_warning_after {
            core.timers.idle_warning = Some(shared.scheduler.schedule(
                after,
                self.deferred(move |c| async move { c.on_idle_warning(epoch).await }),
            ));
        }
    }

    /// A timer action that runs `f` on a new task, if the controller still
    /// exists when the timer fires.
    fn deferred<F, Fut>(&self, f: F) -> Action
    where
        F: FnOnce(SessionController<S>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                tokio::spawn(f(SessionController { shared }));
            }
        })
    }

    fn transition(&self, core: &mut Core, to: SessionState) -> bool {
        if core.state == to {
            return true;
        }
        if !core.state.can_transition_to(to) {
            warn!(from = %core.state, to = %to, "illegal session transition ignored");
            return false;
        }
        debug!(from = %core.state, to = %to, "session state changed");
        core.state = to;
        self.publish(core);
        true
    }

    fn publish(&self, core: &Core) {
        self.shared.status.send_replace(SessionStatus {
            state: core.state,
            user: core.session.as_ref().map(|session| session.user.clone()),
            reason: core.reason,
        });
    }

    fn publish_notice(&self, notice: Notice) {
        // No subscriber is fine: the notice is simply not shown.
        let _ = self.shared.notices.send(notice);
    }
}
