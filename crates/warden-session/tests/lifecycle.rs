//! Sign-in, validation, refresh and teardown through the public controller
//! API, under simulated time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use warden_protocol::{AuthEvent, Notice, StoredCredential, unix_now};
use warden_session::{
    SIGN_OUT_REQUEST, ServiceError, SessionState, Storage, TerminationReason, profile_cache_key,
};

// =========================================================================
// Start / restore
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_with_valid_credential_authenticates() {
    let h = harness(quiet_config());

    let state = h.controller.start(credential()).await;

    assert_eq!(state, SessionState::Authenticated);
    assert_eq!(h.controller.status().user, Some(user()));
    assert_eq!(h.service.session_calls(), 1);
    assert!(h.storage.contains(StoredCredential::STORAGE_KEY));
}

#[tokio::test(start_paused = true)]
async fn test_start_loads_and_caches_profile() {
    let h = harness(quiet_config());

    h.controller.start(credential()).await;

    assert_eq!(h.controller.profile().await, Some(profile()));
    assert!(h.controller.cache().contains_key(&profile_cache_key(&user())));
    assert_eq!(h.service.profile_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_with_empty_token_is_refused() {
    let h = harness(quiet_config());
    let mut cred = credential();
    cred.access_token = "  ".into();

    assert_eq!(h.controller.start(cred).await, SessionState::Unauthenticated);
    assert_eq!(h.service.session_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restore_resumes_persisted_credential() {
    let h = harness(quiet_config());
    Storage::new(Arc::clone(&h.storage)).save_credential(&credential());

    assert_eq!(h.controller.restore().await, SessionState::Authenticated);
    assert_eq!(h.controller.status().user, Some(user()));
}

#[tokio::test(start_paused = true)]
async fn test_restore_without_credential_stays_unauthenticated() {
    let h = harness(quiet_config());

    assert_eq!(h.controller.restore().await, SessionState::Unauthenticated);
    assert_eq!(h.service.session_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_with_unreachable_service_presumes_credential_valid() {
    let h = harness(quiet_config());
    h.service
        .reply_session(Err(ServiceError::Network("offline".into())));

    assert_eq!(
        h.controller.start(credential()).await,
        SessionState::Authenticated
    );
}

// =========================================================================
// Validation outcomes
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_remote_session_terminates_as_expired() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    let mut notices = h.controller.notices();

    h.service.reply_session(Ok(None));
    h.controller.validate_now().await;

    let status = h.controller.status();
    assert_eq!(status.state, SessionState::Terminated);
    assert_eq!(status.reason, Some(TerminationReason::SessionExpired));
    assert_eq!(status.user, None);
    assert_eq!(notices.try_recv().unwrap(), Notice::SessionExpired);
    assert!(!h.storage.contains(StoredCredential::STORAGE_KEY));
}

#[tokio::test(start_paused = true)]
async fn test_session_past_expiry_terminates_as_expired() {
    let h = harness(quiet_config());
    h.service
        .reply_session(Ok(Some(live_session(Some(unix_now() - 10)))));

    let state = h.controller.start(credential()).await;

    assert_eq!(state, SessionState::Terminated);
    assert_eq!(
        h.controller.status().reason,
        Some(TerminationReason::SessionExpired)
    );
    assert_eq!(h.service.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_near_expiry_session_is_refreshed() {
    let h = harness(quiet_config());
    h.service
        .reply_session(Ok(Some(live_session(Some(unix_now() + 120)))));

    let state = h.controller.start(credential()).await;

    assert_eq!(state, SessionState::Authenticated);
    assert_eq!(h.service.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ample_lifetime_skips_refresh() {
    let h = harness(quiet_config());
    h.service
        .reply_session(Ok(Some(live_session(Some(unix_now() + 3600)))));

    h.controller.start(credential()).await;

    assert_eq!(h.service.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_terminates() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    let mut notices = h.controller.notices();

    h.service
        .reply_session(Ok(Some(live_session(Some(unix_now() + 60)))));
    h.service
        .reply_refresh(Err(ServiceError::Auth("refresh token revoked".into())));
    h.controller.validate_now().await;

    assert_eq!(h.controller.state(), SessionState::Terminated);
    assert_eq!(
        h.controller.status().reason,
        Some(TerminationReason::RefreshFailed)
    );
    assert_eq!(notices.try_recv().unwrap(), Notice::RefreshFailed);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_network_error_keeps_session() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;

    h.service
        .reply_session(Ok(Some(live_session(Some(unix_now() + 60)))));
    h.service
        .reply_refresh(Err(ServiceError::Network("offline".into())));
    h.controller.validate_now().await;

    assert_eq!(h.controller.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_make_one_call() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    h.service.set_latency(Duration::from_secs(1));
    let before = h.service.session_calls();

    let a = tokio::spawn({
        let c = h.controller.clone();
        async move { c.validate_now().await }
    });
    let b = tokio::spawn({
        let c = h.controller.clone();
        async move { c.validate_now().await }
    });
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(h.service.session_calls(), before + 1);
    assert_eq!(h.controller.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_status_watch_sees_transitions() {
    let h = harness(quiet_config());
    let mut status = h.controller.subscribe();

    h.controller.start(credential()).await;

    assert!(status.has_changed().unwrap());
    assert_eq!(status.borrow_and_update().state, SessionState::Authenticated);
}

// =========================================================================
// Periodic and presence triggers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_periodic_validation_every_interval() {
    let h = harness(
        quiet_config().with_validation_interval(3 * MIN),
    );
    h.controller.start(credential()).await;
    assert_eq!(h.service.session_calls(), 1);

    // Each tick is debounced by 2 seconds before the call goes out.
    sleep(3 * MIN + Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(h.service.session_calls(), 2);

    sleep(3 * MIN).await;
    settle().await;
    assert_eq!(h.service.session_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_short_absence_does_not_revalidate() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;

    h.controller.on_visible(MIN).await;
    sleep(Duration::from_secs(10)).await;
    settle().await;

    assert_eq!(h.service.session_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_long_absence_revalidates_after_grace() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;

    h.controller.on_visible(6 * MIN).await;
    sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(h.service.session_calls(), 1, "grace + debounce not elapsed");

    sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(h.service.session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_revalidates() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;

    h.controller.on_reconnect().await;
    sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(h.service.session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_triggers_coalesces() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;

    for _ in 0..5 {
        h.controller.request_validation();
        sleep(Duration::from_millis(500)).await;
    }
    sleep(Duration::from_secs(3)).await;
    settle().await;

    assert_eq!(h.service.session_calls(), 2);
}

// =========================================================================
// Auth events
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_signed_in_event_installs_session() {
    let h = harness(quiet_config());

    h.controller
        .handle_auth_event(AuthEvent::SignedIn(live_session(None)))
        .await;

    assert_eq!(h.controller.state(), SessionState::Authenticated);
    assert_eq!(h.controller.profile().await, Some(profile()));
    assert!(h.storage.contains(StoredCredential::STORAGE_KEY));
}

#[tokio::test(start_paused = true)]
async fn test_token_refreshed_event_persists_new_token() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;

    let mut refreshed = live_session(Some(unix_now() + 3600));
    refreshed.access_token = "tok-2".into();
    h.controller
        .handle_auth_event(AuthEvent::TokenRefreshed(refreshed))
        .await;

    let stored = Storage::new(Arc::clone(&h.storage))
        .load_credential()
        .unwrap();
    assert_eq!(stored.access_token, "tok-2");
    assert_eq!(h.controller.state(), SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_remote_sign_out_terminates_without_calling_service() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    let mut notices = h.controller.notices();

    h.controller.handle_auth_event(AuthEvent::SignedOut).await;

    assert_eq!(
        h.controller.status().reason,
        Some(TerminationReason::RemoteSignOut)
    );
    assert_eq!(h.service.sign_out_calls(), 0);
    assert!(notices.try_recv().is_err(), "remote sign-out is silent");
}

// =========================================================================
// Profile cache
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_profile_served_from_cache_until_ttl() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    assert_eq!(h.service.profile_calls(), 1);

    assert_eq!(h.controller.load_profile().await, Some(profile()));
    assert_eq!(h.service.profile_calls(), 1);

    sleep(11 * MIN).await;
    assert_eq!(h.controller.load_profile().await, Some(profile()));
    assert_eq!(h.service.profile_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_profile_is_not_an_error() {
    let h = harness(quiet_config());
    h.service.reply_profile(Ok(None));

    h.controller.start(credential()).await;

    assert_eq!(h.controller.profile().await, None);
    assert_eq!(h.controller.auth_error_count().await, 0);
    assert_eq!(h.controller.state(), SessionState::Authenticated);
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_out_tears_down_whether_service_succeeds_or_fails() {
    for reply in [Ok(()), Err(ServiceError::Network("offline".into()))] {
        let h = harness(quiet_config());
        h.controller.start(credential()).await;
        h.controller.cache().set("dashboard", Value::from(42));
        let in_flight = h.controller.requests().begin("dashboard-data");
        h.service.reply_sign_out(reply);

        h.controller.sign_out().await;

        assert!(in_flight.is_cancelled());
        assert_eq!(h.controller.requests().pending_count(), 0);
        assert!(h.controller.cache().is_empty());
        assert!(!h.storage.contains(StoredCredential::STORAGE_KEY));
        assert_eq!(h.controller.state(), SessionState::Terminated);
        assert_eq!(
            h.controller.status().reason,
            Some(TerminationReason::SignedOut)
        );
        assert_eq!(h.service.sign_out_calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_cancels_in_flight_validation() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    h.service.set_latency(Duration::from_secs(10));

    let validation = tokio::spawn({
        let c = h.controller.clone();
        async move { c.validate_now().await }
    });
    settle().await;
    h.service.set_latency(Duration::ZERO);
    h.controller.sign_out().await;
    validation.await.unwrap();

    assert_eq!(h.controller.state(), SessionState::Terminated);
    assert_eq!(h.controller.requests().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_cancels_pending_service_sign_out() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    h.service.set_latency(Duration::from_secs(5));
    h.service.reply_session(Ok(None));

    let validation = tokio::spawn({
        let c = h.controller.clone();
        async move { c.validate_now().await }
    });
    // The check answers at 5s; the sign-out it triggers would land at 10s.
    sleep(Duration::from_secs(6)).await;
    assert_eq!(h.controller.state(), SessionState::Terminated);
    assert!(h.controller.requests().is_pending(SIGN_OUT_REQUEST));

    h.service.set_latency(Duration::ZERO);
    h.service.reply_session(Ok(Some(live_session(None))));
    let before = Instant::now();
    h.controller
        .handle_auth_event(AuthEvent::SignedIn(live_session(None)))
        .await;
    validation.await.unwrap();

    assert!(before.elapsed() < Duration::from_secs(1), "sign-out ran to completion");
    assert!(!h.controller.requests().is_pending(SIGN_OUT_REQUEST));
    assert_eq!(h.controller.state(), SessionState::Authenticated);
    assert_eq!(h.service.sign_out_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_after_termination_starts_fresh() {
    let h = harness(quiet_config());
    h.controller.start(credential()).await;
    h.controller.sign_out().await;

    let state = h.controller.start(credential()).await;

    assert_eq!(state, SessionState::Authenticated);
    assert_eq!(h.controller.status().reason, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_keeps_state_but_stops_work() {
    let h = harness(quiet_config().with_validation_interval(3 * MIN));
    h.controller.start(credential()).await;
    let pending = h.controller.requests().begin("dashboard-data");

    h.controller.shutdown().await;
    sleep(10 * MIN).await;
    settle().await;

    assert!(pending.is_cancelled());
    assert_eq!(h.controller.state(), SessionState::Authenticated);
    assert_eq!(h.service.session_calls(), 1, "no periodic validation after shutdown");
}
