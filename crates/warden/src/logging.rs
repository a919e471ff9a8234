//! Logging setup.
//!
//! Library crates only emit `tracing` events. Hosts that don't install
//! their own subscriber can call [`init_logging`].

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::WardenError;

/// Installs a global fmt subscriber.
///
/// `default_directive` (for example `"warden=info,warn"`) applies unless
/// `RUST_LOG` is set, in which case `RUST_LOG` wins.
///
/// # Errors
/// `WardenError::Logging` if a global subscriber is already installed.
pub fn init_logging(default_directive: &str) -> Result<(), WardenError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(filter))
        .try_init()
        .map_err(|e| WardenError::Logging(e.to_string()))
}
