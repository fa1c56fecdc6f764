use super::fetcher::FetchClient;
use super::snapshot::Snapshot;
use super::store::SnapshotStore;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSource {
    Cache,
    Fresh,
}

/// Result of a gateway read.
#[derive(Debug, Clone)]
pub struct CacheRead {
    pub snapshot: Arc<Snapshot>,
    pub source: ReadSource,
    /// Age of the cached snapshot when served from cache
    pub age: Option<Duration>,
}

impl CacheRead {
    #[must_use]
    pub const fn from_cache(&self) -> bool {
        matches!(self.source, ReadSource::Cache)
    }
}

/// Read path deciding between the cached snapshot and a synchronous refresh.
///
/// Precedence is fixed: an explicit refresh request first, then staleness,
/// then validity. Concurrent readers that all find the cache stale each do
/// their own fetch.
#[derive(Clone)]
pub struct AccessGateway {
    store: Arc<SnapshotStore>,
    fetcher: Arc<dyn FetchClient>,
}

impl AccessGateway {
    #[must_use]
    pub fn new(store: Arc<SnapshotStore>, fetcher: Arc<dyn FetchClient>) -> Self {
        Self { store, fetcher }
    }

    /// # Errors
    ///
    /// Returns `Error::Fetch` if a refresh was needed and the fetch failed.
    /// The store is left untouched in that case.
    pub async fn get(&self, force_refresh: bool, max_age: Duration) -> Result<CacheRead> {
        if !force_refresh && !self.store.is_stale(max_age) {
            let age = self.store.age();
            if let Some(snapshot) = self.store.read() {
                debug!("🎯 Cache HIT");
                return Ok(CacheRead {
                    snapshot,
                    source: ReadSource::Cache,
                    age,
                });
            }
        }

        debug!(
            "🔄 Cache {}",
            if force_refresh { "REFRESH" } else { "STALE" }
        );
        self.refresh().await
    }

    async fn refresh(&self) -> Result<CacheRead> {
        let start = Instant::now();
        let snapshot = self.fetcher.fetch().await?;
        let snapshot = Arc::new(snapshot);
        self.store.update(snapshot.clone());
        info!(
            "✅ FETCH SUCCESS: on-demand ({:.2}s)",
            start.elapsed().as_secs_f64()
        );
        Ok(CacheRead {
            snapshot,
            source: ReadSource::Fresh,
            age: None,
        })
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }
}
