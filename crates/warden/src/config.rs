//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_cache::CacheConfig;
use warden_session::SessionConfig;

use crate::WardenError;

/// Everything a [`Warden`](crate::Warden) needs to know, in one document.
///
/// Missing fields fall back to their defaults, so a host can ship a
/// partial JSON file:
///
/// ```
/// use warden::WardenConfig;
///
/// let config = WardenConfig::from_json(r#"{ "session": { "auth_error_threshold": 5 } }"#).unwrap();
/// assert_eq!(config.session.auth_error_threshold, 5);
/// assert_eq!(config.cache.capacity, 50);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Shared response cache.
    pub cache: CacheConfig,

    /// Session lifecycle policy.
    pub session: SessionConfig,

    /// Upper bound on the random delay added to each periodic timer's
    /// first tick. Zero disables jitter.
    pub timer_jitter: Duration,
}

impl WardenConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document, then [`validated`](Self::validated).
    pub fn from_json(text: &str) -> Result<Self, WardenError> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.validated())
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_timer_jitter(mut self, jitter: Duration) -> Self {
        self.timer_jitter = jitter;
        self
    }

    /// Validates both halves.
    pub fn validated(mut self) -> Self {
        self.cache = self.cache.validated();
        self.session = self.session.validated();
        self
    }
}
