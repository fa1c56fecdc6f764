/**
Cache assembly for `clustercache`

Builds the snapshot store, poller, access gateway and event sink once and owns
them for the life of the process. Everything is passed around explicitly; there
is no global cache instance.
*/
use crate::cache::config::{DEFAULT_MAX_AGE_SECS, PollerConfig};
use crate::cache::{AccessGateway, FetchClient, Poller, PollerStatus, SnapshotStore};
use crate::events::{CacheEvent, EVENTS_SUBJECT, EventSink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub poller: PollerConfig,
    /// Oldest snapshot a reader accepts before refreshing synchronously
    pub max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
        }
    }
}

pub struct ClusterCache {
    store: Arc<SnapshotStore>,
    poller: Poller,
    gateway: AccessGateway,
    events: Arc<dyn EventSink>,
    max_age: Duration,
    started_at: Instant,
}

impl ClusterCache {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn FetchClient>,
        events: Arc<dyn EventSink>,
        settings: CacheSettings,
    ) -> Self {
        let store = Arc::new(SnapshotStore::new());
        let poller = Poller::new(
            store.clone(),
            fetcher.clone(),
            events.clone(),
            settings.poller,
        );
        let gateway = AccessGateway::new(store.clone(), fetcher);

        Self {
            store,
            poller,
            gateway,
            events,
            max_age: settings.max_age,
            started_at: Instant::now(),
        }
    }

    /// Start the poller and announce the service.
    pub fn initialize(&self) {
        self.poller.start();
        self.announce(CacheEvent::ServiceStarted);
        info!(
            "Cache initialized: {}s poll interval, {}s max age",
            self.poller.interval().as_secs(),
            self.max_age.as_secs()
        );
    }

    /// Stop the poller. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.poller.stop().await {
            info!("Cache shutdown complete");
        }
    }

    /// Publish `event` in the background; the caller never waits on the bus.
    pub fn announce(&self, event: CacheEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            events.publish(EVENTS_SUBJECT, event.to_payload()).await;
        });
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    #[must_use]
    pub const fn poller(&self) -> &Poller {
        &self.poller
    }

    #[must_use]
    pub const fn gateway(&self) -> &AccessGateway {
        &self.gateway
    }

    #[must_use]
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    #[must_use]
    pub fn events_enabled(&self) -> bool {
        self.events.is_enabled()
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn status(&self) -> PollerStatus {
        self.poller.status()
    }
}

