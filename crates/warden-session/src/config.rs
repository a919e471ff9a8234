//! Session controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MINUTE: Duration = Duration::from_secs(60);

/// Timing and budget settings for the
/// [`SessionController`](crate::SessionController).
///
/// Every field has a default matching the behavior of the web client this
/// core was built for; override just the ones you need with the `with_*`
/// setters or a partial JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often a live session is revalidated. Default: 3 minutes.
    pub validation_interval: Duration,

    /// Quiet period that collapses bursts of validation triggers into one
    /// call. Default: 2 seconds.
    pub validation_debounce: Duration,

    /// A session with less remaining lifetime than this is refreshed during
    /// validation. Default: 5 minutes.
    pub refresh_threshold: Duration,

    /// Consecutive auth errors that force termination. Default: 3.
    pub auth_error_threshold: u32,

    /// An auth error arriving more than this long after the previous one
    /// starts a new count. Default: 10 minutes.
    pub auth_error_window: Duration,

    /// When `true`, network errors never count toward any termination
    /// policy. When `false` they are treated like unexpected errors and
    /// fall under [`stale_validation_limit`](Self::stale_validation_limit).
    /// Default: `true`.
    pub tolerate_network_errors: bool,

    /// Unexpected validation failures terminate the session once the last
    /// successful validation is older than this. `None` disables the
    /// policy. Default: 10 minutes.
    pub stale_validation_limit: Option<Duration>,

    /// A page coming back into view revalidates only if it was hidden
    /// longer than this. Default: 5 minutes.
    pub revalidate_after_hidden: Duration,

    /// Delay between a visibility/reconnect trigger and the validation it
    /// schedules, so the page and connection can settle. Default: 2 seconds.
    pub grace_delay: Duration,

    /// No activity for this long signs the user out. Default: 30 minutes.
    pub inactivity_timeout: Duration,

    /// Activity only restarts the inactivity timer once this much time has
    /// passed since the last restart. Default: 5 minutes.
    pub activity_reset_granularity: Duration,

    /// Publish one [`Notice::IdleWarning`](warden_protocol::Notice) after
    /// this long without activity. `None` disables it. Default: 20 minutes.
    pub idle_warning_after: Option<Duration>,

    /// TTL of the cached user profile. Default: 10 minutes.
    pub profile_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validation_interval: 3 * MINUTE,
            validation_debounce: Duration::from_secs(2),
            refresh_threshold: 5 * MINUTE,
            auth_error_threshold: 3,
            auth_error_window: 10 * MINUTE,
            tolerate_network_errors: true,
            stale_validation_limit: Some(10 * MINUTE),
            revalidate_after_hidden: 5 * MINUTE,
            grace_delay: Duration::from_secs(2),
            inactivity_timeout: 30 * MINUTE,
            activity_reset_granularity: 5 * MINUTE,
            idle_warning_after: Some(20 * MINUTE),
            profile_ttl: 10 * MINUTE,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validation_interval(mut self, interval: Duration) -> Self {
        self.validation_interval = interval;
        self
    }

    pub fn with_validation_debounce(mut self, delay: Duration) -> Self {
        self.validation_debounce = delay;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_auth_error_threshold(mut self, threshold: u32) -> Self {
        self.auth_error_threshold = threshold;
        self
    }

    pub fn with_auth_error_window(mut self, window: Duration) -> Self {
        self.auth_error_window = window;
        self
    }

    pub fn with_tolerate_network_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_network_errors = tolerate;
        self
    }

    pub fn with_stale_validation_limit(mut self, limit: Option<Duration>) -> Self {
        self.stale_validation_limit = limit;
        self
    }

    pub fn with_revalidate_after_hidden(mut self, hidden: Duration) -> Self {
        self.revalidate_after_hidden = hidden;
        self
    }

    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn with_activity_reset_granularity(mut self, granularity: Duration) -> Self {
        self.activity_reset_granularity = granularity;
        self
    }

    pub fn with_idle_warning_after(mut self, after: Option<Duration>) -> Self {
        self.idle_warning_after = after;
        self
    }

    pub fn with_profile_ttl(mut self, ttl: Duration) -> Self {
        self.profile_ttl = ttl;
        self
    }

    /// Fix out-of-range values. Called when the controller is built.
    ///
    /// - an auth error threshold of 0 becomes 1
    /// - a zero validation interval falls back to the default
    /// - an idle warning at or after the inactivity timeout is disabled,
    ///   since the user would already be signed out
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.auth_error_threshold == 0 {
            tracing::warn!("auth error threshold 0 is not usable, clamping to 1");
            self.auth_error_threshold = 1;
        }
        if self.validation_interval.is_zero() {
            self.validation_interval = defaults.validation_interval;
        }
        if let Some(after) = self.idle_warning_after {
            if after >= self.inactivity_timeout {
                tracing::warn!(
                    idle_warning_ms = after.as_millis() as u64,
                    inactivity_ms = self.inactivity_timeout.as_millis() as u64,
                    "idle warning would fire after the inactivity sign-out, disabling it"
                );
                self.idle_warning_after = None;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_constants() {
        let c = SessionConfig::default();
        assert_eq!(c.validation_interval, Duration::from_secs(180));
        assert_eq!(c.validation_debounce, Duration::from_secs(2));
        assert_eq!(c.refresh_threshold, Duration::from_secs(300));
        assert_eq!(c.auth_error_threshold, 3);
        assert!(c.tolerate_network_errors);
        assert_eq!(c.stale_validation_limit, Some(Duration::from_secs(600)));
        assert_eq!(c.revalidate_after_hidden, Duration::from_secs(300));
        assert_eq!(c.grace_delay, Duration::from_secs(2));
        assert_eq!(c.inactivity_timeout, Duration::from_secs(1800));
        assert_eq!(c.activity_reset_granularity, Duration::from_secs(300));
        assert_eq!(c.idle_warning_after, Some(Duration::from_secs(1200)));
        assert_eq!(c.profile_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_validated_clamps_zero_threshold() {
        let c = SessionConfig::new().with_auth_error_threshold(0).validated();
        assert_eq!(c.auth_error_threshold, 1);
    }

    #[test]
    fn test_validated_disables_idle_warning_past_timeout() {
        let c = SessionConfig::new()
            .with_inactivity_timeout(Duration::from_secs(60))
            .with_idle_warning_after(Some(Duration::from_secs(60)))
            .validated();
        assert_eq!(c.idle_warning_after, None);
    }

    #[test]
    fn test_validated_keeps_sane_config_unchanged() {
        let c = SessionConfig::default();
        assert_eq!(c.clone().validated(), c);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c: SessionConfig =
            serde_json::from_str(r#"{"auth_error_threshold":5,"stale_validation_limit":null}"#)
                .unwrap();
        assert_eq!(c.auth_error_threshold, 5);
        assert_eq!(c.stale_validation_limit, None);
        assert_eq!(c.inactivity_timeout, Duration::from_secs(1800));
    }
}
