use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use warden::init_logging;
use warden::prelude::*;

// ---------------------------------------------------------------------------
// In-memory auth backend
// ---------------------------------------------------------------------------

/// Tokens issued by a pretend auth server, with their owners.
#[derive(Clone, Default)]
struct InMemoryAuth {
    tokens: Arc<Mutex<HashMap<String, ServiceSession>>>,
}

impl InMemoryAuth {
    fn issue(&self, user: &str, token: &str) -> ServiceSession {
        let session = ServiceSession {
            user: UserId::new(user),
            access_token: token.into(),
            expires_at: None,
        };
        self.tokens
            .lock()
            .unwrap()
            .insert(token.into(), session.clone());
        session
    }

    fn revoke(&self, token: &str) {
        self.tokens.lock().unwrap().remove(token);
    }
}

impl SessionService for InMemoryAuth {
    async fn get_current_session(
        &self,
        token: &str,
    ) -> Result<Option<ServiceSession>, ServiceError> {
        Ok(self.tokens.lock().unwrap().get(token).cloned())
    }

    async fn refresh_session(&self, token: &str) -> Result<(), ServiceError> {
        if self.tokens.lock().unwrap().contains_key(token) {
            Ok(())
        } else {
            Err(ServiceError::Auth("unknown token".into()))
        }
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn fetch_profile(
        &self,
        user: &UserId,
        _token: &str,
    ) -> Result<Option<UserProfile>, ServiceError> {
        Ok(Some(UserProfile {
            id: user.clone(),
            full_name: Some(format!("User {user}")),
            email: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("warden=debug,session_demo=info,warn")?;

    let auth = InMemoryAuth::default();
    let config = WardenConfig::new().with_session(
        SessionConfig::new()
            .with_validation_interval(Duration::from_secs(2))
            .with_validation_debounce(Duration::from_millis(200)),
    );
    let warden = Warden::builder(auth.clone()).config(config).build().await;

    let mut notices = warden.controller().notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            tracing::info!(%notice, "notice for the user");
        }
    });

    let (events, rx) = mpsc::channel(8);
    warden.attach_auth_events(rx);
    events
        .send(AuthEvent::SignedIn(auth.issue("ada", "tok-ada")))
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracing::info!(state = %warden.state(), "after sign-in");

    warden
        .handle_presence(PresenceSignal::Interaction(InteractionKind::KeyPress))
        .await;

    // The server revokes the token; the next periodic check notices.
    auth.revoke("tok-ada");
    tokio::time::sleep(Duration::from_secs(3)).await;
    tracing::info!(state = %warden.state(), reason = ?warden.controller().status().reason, "after revocation");

    warden.handle_presence(PresenceSignal::Unload).await;
    Ok(())
}
