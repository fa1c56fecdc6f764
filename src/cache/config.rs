/**
 * Configuration constants for the cluster snapshot cache and its poller
 */
use crate::error::{Error, Result};
use std::time::Duration;

/// Seconds between two scheduled poller ticks
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Readers refresh synchronously once the snapshot is older than this
pub const DEFAULT_MAX_AGE_SECS: u64 = 30;

/// How long `stop()` waits for an in-flight tick before aborting it
pub const DEFAULT_STOP_GRACE_SECS: u64 = 10;

/// Source tag attached to published events
pub const EVENT_SOURCE: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub stop_grace: Duration,
}

impl PollerConfig {
    /// # Errors
    ///
    /// Returns `Error::Config` if `interval_secs` is zero
    pub fn new(interval_secs: u64, stop_grace_secs: u64) -> Result<Self> {
        if interval_secs == 0 {
            return Err(Error::Config("poll interval must be greater than 0".to_string()));
        }
        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            stop_grace: Duration::from_secs(stop_grace_secs),
        })
    }

    #[must_use]
    pub const fn interval_secs(&self) -> u64 {
        self.interval.as_secs()
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
        }
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_POLL_INTERVAL_SECS > 0, "DEFAULT_POLL_INTERVAL_SECS must be greater than 0");
    assert!(DEFAULT_STOP_GRACE_SECS > 0, "DEFAULT_STOP_GRACE_SECS must be greater than 0");
};
