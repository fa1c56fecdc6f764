use super::snapshot::Snapshot;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use k8s_openapi::serde_json::Value;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Sentinel reported as the age of a store that holds nothing valid.
pub const INVALID_AGE_MS: i64 = -1;

/// A committed snapshot together with the moment it was stored. Swapped in as
/// one unit so readers can never pair a snapshot with another update's time.
#[derive(Debug)]
struct Committed {
    snapshot: Arc<Snapshot>,
    stored_at: Instant,
    stored_at_wall: DateTime<Utc>,
}

impl Committed {
    fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

/// Holds the last successfully fetched cluster snapshot.
///
/// Reads are lock-free loads of the current pointer. `update` and
/// `invalidate` replace the pointer atomically, so concurrent writers are
/// serialized by the swap itself and no reader ever sees a half-written
/// state.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: ArcSwapOption<Committed>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, snapshot: impl Into<Arc<Snapshot>>) {
        let snapshot = snapshot.into();
        let entries = snapshot.len();
        let committed = Committed {
            snapshot,
            stored_at: Instant::now(),
            stored_at_wall: Utc::now(),
        };
        let stored_at = committed.stored_at_wall;
        self.current.store(Some(Arc::new(committed)));
        info!("💾 Cache STORE: {} entries at {}", entries, stored_at.to_rfc3339());
    }

    /// Current snapshot, or `None` when nothing valid is stored.
    #[must_use]
    pub fn read(&self) -> Option<Arc<Snapshot>> {
        self.current
            .load_full()
            .map(|committed| committed.snapshot.clone())
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.current
            .load_full()
            .and_then(|committed| committed.snapshot.get(key).cloned())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.current.load().is_some()
    }

    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.current
            .load_full()
            .map(|committed| committed.stored_at_wall)
    }

    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.current.load_full().map(|committed| committed.age())
    }

    /// Age in milliseconds, or [`INVALID_AGE_MS`] when invalid.
    #[must_use]
    pub fn age_ms(&self) -> i64 {
        age_ms(self.age())
    }

    /// True when nothing valid is stored or the snapshot is older than
    /// `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age().is_none_or(|age| age > max_age)
    }

    pub fn invalidate(&self) {
        self.current.store(None);
        debug!("🔄 Cache INVALIDATED");
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.current.load_full().map_or_else(CacheStats::empty, |committed| CacheStats {
            valid: true,
            entry_count: committed.snapshot.len(),
            last_updated: Some(committed.stored_at_wall),
            age_ms: duration_ms(committed.age()),
        })
    }
}

/// Milliseconds for an optional age, [`INVALID_AGE_MS`] when absent.
#[must_use]
pub fn age_ms(age: Option<Duration>) -> i64 {
    age.map_or(INVALID_AGE_MS, duration_ms)
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> i64 {
    duration.as_millis().min(i64::MAX as u128) as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    #[serde(rename = "isValid")]
    pub valid: bool,
    pub entry_count: usize,
    #[serde(serialize_with = "serialize_epoch_ms")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "cacheAge")]
    pub age_ms: i64,
}

impl CacheStats {
    const fn empty() -> Self {
        Self {
            valid: false,
            entry_count: 0,
            last_updated: None,
            age_ms: INVALID_AGE_MS,
        }
    }
}

// Epoch milliseconds, 0 when the store was never updated.
fn serialize_epoch_ms<S: serde::Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(value.map_or(0, |at| at.timestamp_millis()))
}
