use async_trait::async_trait;
use clustercache::app::{CacheSettings, ClusterCache};
use clustercache::cache::{
    AccessGateway, FetchClient, FetchError, Poller, PollerConfig, ReadSource, Snapshot,
    SnapshotStore,
};
use clustercache::events::NoopEventSink;
use k8s_openapi::serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Returns `{"n": <call number>}` until told to fail.
#[derive(Default)]
struct SequenceFetcher {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl SequenceFetcher {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchClient for SequenceFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable(format!("fetch {n} refused")));
        }
        Ok([("n", json!(n))].into_iter().collect())
    }
}

fn poller(store: Arc<SnapshotStore>, fetcher: Arc<SequenceFetcher>, interval_secs: u64) -> Poller {
    Poller::new(
        store,
        fetcher,
        Arc::new(NoopEventSink),
        PollerConfig::new(interval_secs, 5).unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_poller_keeps_store_fresh() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let poller = poller(store.clone(), fetcher.clone(), 1);

    assert!(poller.start());
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(fetcher.calls() >= 2);
    assert!(store.is_valid());
    assert!(store.get_value("n").is_some());
    assert!(poller.stop().await);
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_keeps_previous_snapshot() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let poller = poller(store.clone(), fetcher.clone(), 1);
    let gateway = AccessGateway::new(store.clone(), fetcher.clone());

    poller.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    fetcher.fail.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(fetcher.calls() >= 2);
    let status = poller.status();
    assert_eq!(status.ticks_succeeded, 1);
    assert!(status.ticks_failed >= 1);

    let read = gateway.get(false, Duration::from_secs(300)).await.unwrap();
    assert_eq!(read.source, ReadSource::Cache);
    assert_eq!(read.snapshot.get("n"), Some(&json!(1)));
    poller.stop().await;
}

#[tokio::test]
async fn test_empty_store_fetches_inline() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let gateway = AccessGateway::new(store.clone(), fetcher.clone());

    let read = gateway.get(false, Duration::from_secs(30)).await.unwrap();

    assert_eq!(read.source, ReadSource::Fresh);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(store.read().unwrap().get("n"), Some(&json!(1)));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_runs_one_loop() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let poller = poller(store, fetcher.clone(), 1);

    assert!(poller.start());
    assert!(!poller.start());
    tokio::time::sleep(Duration::from_millis(2500)).await;

    // Ticks at 0s, 1s and 2s from a single schedule.
    assert_eq!(fetcher.calls(), 3);
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_start_resumes() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let poller = poller(store, fetcher.clone(), 1);

    poller.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(poller.stop().await);
    let stopped_at = fetcher.calls();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fetcher.calls(), stopped_at);
    assert!(!poller.is_running());

    assert!(poller.start());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fetcher.calls(), stopped_at + 1);
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_force_update_adds_one_tick() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let poller = poller(store.clone(), fetcher.clone(), 30);

    poller.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.calls(), 1);

    assert!(poller.force_update());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(store.get_value("n"), Some(json!(2)));
    poller.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_all_succeed() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let gateway = AccessGateway::new(store, fetcher.clone());

    let reads = futures::future::join_all((0..16).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.get(false, Duration::from_secs(30)).await }
    }))
    .await;

    assert!(reads.iter().all(Result::is_ok));
    assert!(fetcher.calls() >= 1);
    assert!(reads
        .iter()
        .flatten()
        .all(|read| read.snapshot.get("n").is_some()));
}

/// Hangs for a minute per call while `slow` is set.
#[derive(Default)]
struct SlowFetcher {
    calls: AtomicUsize,
    slow: AtomicBool,
}

#[async_trait]
impl FetchClient for SlowFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok([("n", json!(n))].into_iter().collect())
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_tick_after_grace() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SlowFetcher::default());
    fetcher.slow.store(true, Ordering::SeqCst);
    let poller = Poller::new(
        store.clone(),
        fetcher.clone(),
        Arc::new(NoopEventSink),
        PollerConfig::new(1, 1).unwrap(),
    );

    poller.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    let started = tokio::time::Instant::now();
    assert!(poller.stop().await);
    let waited = started.elapsed();

    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_secs(2));
    assert!(!store.is_valid());
    assert!(!poller.is_running());

    // The aborted fetch never lands, even after its sleep would have ended.
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert!(!store.is_valid());

    fetcher.slow.store(false, Ordering::SeqCst);
    assert!(poller.start());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_value("n"), Some(json!(2)));
    poller.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_spawns_one_loop() {
    let store = Arc::new(SnapshotStore::new());
    let fetcher = Arc::new(SequenceFetcher::default());
    let poller = Arc::new(poller(store, fetcher.clone(), 30));
    let barrier = Arc::new(tokio::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let poller = poller.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                poller.start()
            })
        })
        .collect();
    let started = futures::future::join_all(handles).await;

    let winners = started.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(winners, 1);
    assert!(poller.is_running());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fetcher.calls(), 1);
    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cluster_cache_lifecycle() {
    let fetcher = Arc::new(SequenceFetcher::default());
    let cache = ClusterCache::new(
        fetcher.clone(),
        Arc::new(NoopEventSink),
        CacheSettings::default(),
    );

    cache.initialize();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cache.status().running);
    assert!(cache.store().is_valid());

    cache.shutdown().await;
    cache.shutdown().await;
    assert!(!cache.poller().is_running());
}
