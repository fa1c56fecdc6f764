use super::store::CacheStats;
use serde::Serialize;

/// Read-only view for health and monitoring consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    #[serde(flatten)]
    pub cache: CacheStats,
    #[serde(rename = "interrogatorRunning")]
    pub running: bool,
    pub interval_seconds: u64,
    pub ticks_succeeded: u64,
    pub ticks_failed: u64,
}

impl PollerStatus {
    /// True when the poller is running and the cache holds data.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.running && self.cache.valid
    }
}
