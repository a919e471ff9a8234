//! Shared test fixtures: a scriptable session service and a harness that
//! wires it to a controller.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use warden_protocol::{ServiceSession, StoredCredential, UserId, UserProfile};
use warden_session::{
    MemoryStorage, ServiceError, SessionConfig, SessionController, SessionService, Storage,
};

pub const MIN: Duration = Duration::from_secs(60);

pub fn user() -> UserId {
    UserId::new("u-1")
}

pub fn live_session(expires_at: Option<u64>) -> ServiceSession {
    ServiceSession {
        user: user(),
        access_token: "tok-1".into(),
        expires_at,
    }
}

pub fn credential() -> StoredCredential {
    StoredCredential {
        user: user(),
        access_token: "tok-1".into(),
        expires_at: None,
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        id: user(),
        full_name: Some("Ada Lovelace".into()),
        email: Some("ada@example.com".into()),
    }
}

/// Config where only explicit calls drive the controller: validation is
/// hourly and nobody gets signed out for being idle.
pub fn quiet_config() -> SessionConfig {
    SessionConfig::new()
        .with_validation_interval(60 * MIN)
        .with_inactivity_timeout(24 * 60 * MIN)
        .with_idle_warning_after(None)
}

// ---------------------------------------------------------------------------
// MockService
// ---------------------------------------------------------------------------

struct Replies {
    session: Result<Option<ServiceSession>, ServiceError>,
    refresh: Result<(), ServiceError>,
    sign_out: Result<(), ServiceError>,
    profile: Result<Option<UserProfile>, ServiceError>,
    latency: Duration,
}

#[derive(Default)]
struct Calls {
    session: AtomicUsize,
    refresh: AtomicUsize,
    sign_out: AtomicUsize,
    profile: AtomicUsize,
}

/// A session service whose answers the test sets up front. Clones share
/// the same script and counters.
#[derive(Clone)]
pub struct MockService {
    replies: Arc<Mutex<Replies>>,
    calls: Arc<Calls>,
}

impl MockService {
    /// Every call succeeds; the session never expires.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(Replies {
                session: Ok(Some(live_session(None))),
                refresh: Ok(()),
                sign_out: Ok(()),
                profile: Ok(Some(profile())),
                latency: Duration::ZERO,
            })),
            calls: Arc::new(Calls::default()),
        }
    }

    pub fn reply_session(&self, reply: Result<Option<ServiceSession>, ServiceError>) {
        self.replies.lock().unwrap().session = reply;
    }

    pub fn reply_refresh(&self, reply: Result<(), ServiceError>) {
        self.replies.lock().unwrap().refresh = reply;
    }

    pub fn reply_sign_out(&self, reply: Result<(), ServiceError>) {
        self.replies.lock().unwrap().sign_out = reply;
    }

    pub fn reply_profile(&self, reply: Result<Option<UserProfile>, ServiceError>) {
        self.replies.lock().unwrap().profile = reply;
    }

    /// How long every call takes.
    pub fn set_latency(&self, latency: Duration) {
        self.replies.lock().unwrap().latency = latency;
    }

    pub fn session_calls(&self) -> usize {
        self.calls.session.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls.refresh.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.calls.sign_out.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.calls.profile.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let latency = self.replies.lock().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl SessionService for MockService {
    async fn get_current_session(
        &self,
        _token: &str,
    ) -> Result<Option<ServiceSession>, ServiceError> {
        self.calls.session.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let reply = self.replies.lock().unwrap().session.clone();
        reply
    }

    async fn refresh_session(&self, _token: &str) -> Result<(), ServiceError> {
        self.calls.refresh.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let reply = self.replies.lock().unwrap().refresh.clone();
        reply
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        self.calls.sign_out.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let reply = self.replies.lock().unwrap().sign_out.clone();
        reply
    }

    async fn fetch_profile(
        &self,
        _user: &UserId,
        _token: &str,
    ) -> Result<Option<UserProfile>, ServiceError> {
        self.calls.profile.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let reply = self.replies.lock().unwrap().profile.clone();
        reply
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub controller: SessionController<MockService>,
    pub service: MockService,
    pub storage: Arc<MemoryStorage>,
}

pub fn harness(config: SessionConfig) -> Harness {
    let service = MockService::new();
    let storage = Arc::new(MemoryStorage::new());
    let controller = SessionController::builder(service.clone())
        .config(config)
        .storage(Storage::new(Arc::clone(&storage)))
        .build();
    Harness {
        controller,
        service,
        storage,
    }
}

/// Lets spawned timer tasks run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
