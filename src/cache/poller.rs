use super::config::PollerConfig;
use super::fetcher::FetchClient;
use super::status::PollerStatus;
use super::store::SnapshotStore;
use crate::events::{EventSink, METRICS_SUBJECT, metrics_payload};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a tick ran; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    Forced,
}

/// Everything a tick touches, shared between the poller and its worker task.
struct TickContext {
    store: Arc<SnapshotStore>,
    fetcher: Arc<dyn FetchClient>,
    events: Arc<dyn EventSink>,
    ticks_succeeded: AtomicU64,
    ticks_failed: AtomicU64,
    last_tick_ok: AtomicBool,
}

impl TickContext {
    /// Run one tick, absorbing a panic from the fetch client as a failed tick
    /// so the schedule survives it.
    async fn run_tick(&self, trigger: Trigger) {
        if let Err(panic) = AssertUnwindSafe(self.tick(trigger)).catch_unwind().await {
            self.ticks_failed.fetch_add(1, Ordering::Relaxed);
            self.last_tick_ok.store(false, Ordering::Relaxed);
            error!(
                "💥 TICK PANICKED ({:?}) - {}",
                trigger,
                panic_message(panic.as_ref())
            );
        }
    }

    /// One fetch-and-store cycle. A failure is logged and counted; the store
    /// keeps serving the last good snapshot.
    async fn tick(&self, trigger: Trigger) {
        let start = Instant::now();
        debug!("🔄 TICK START ({:?})", trigger);

        match self.fetcher.fetch().await {
            Ok(snapshot) => {
                let metrics = metrics_payload(
                    snapshot.get("podCount"),
                    snapshot.get("deploymentCount"),
                );
                self.store.update(snapshot);
                self.ticks_succeeded.fetch_add(1, Ordering::Relaxed);
                self.last_tick_ok.store(true, Ordering::Relaxed);
                info!(
                    "✅ TICK SUCCESS ({:?}, {:.2}s)",
                    trigger,
                    start.elapsed().as_secs_f64()
                );
                self.events.publish(METRICS_SUBJECT, metrics).await;
            }
            Err(e) => {
                self.ticks_failed.fetch_add(1, Ordering::Relaxed);
                self.last_tick_ok.store(false, Ordering::Relaxed);
                error!(
                    "❌ TICK FAILED ({:?}, {:.2}s) - {}",
                    trigger,
                    start.elapsed().as_secs_f64(),
                    e
                );
            }
        }
    }
}

/// Handle to the spawned scheduling loop of one `Running` period.
struct Worker {
    cancel: CancellationToken,
    force_tx: mpsc::UnboundedSender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(ctx: Arc<TickContext>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (force_tx, force_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_schedule(ctx, interval, cancel.clone(), force_rx));
        Self {
            cancel,
            force_tx,
            handle,
        }
    }

    async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let abort = self.handle.abort_handle();

        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(())) => info!("🛑 Poller stopped"),
            Ok(Err(e)) => warn!("⚠️  Poller worker ended abnormally: {}", e),
            Err(_) => {
                abort.abort();
                warn!(
                    "⚠️  Poller tick still running after {}s, aborted",
                    grace.as_secs()
                );
            }
        }
    }
}

/// Runs one tick right away, then one per `interval` plus any forced ticks,
/// until `cancel` fires. Cancellation is observed between ticks only.
async fn run_schedule(
    ctx: Arc<TickContext>,
    interval: Duration,
    cancel: CancellationToken,
    mut force_rx: mpsc::UnboundedReceiver<()>,
) {
    info!("🚀 Poller started ({}s interval)", interval.as_secs());

    // The first tick of a tokio interval completes immediately.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => ctx.run_tick(Trigger::Scheduled).await,
            Some(()) = force_rx.recv() => ctx.run_tick(Trigger::Forced).await,
        }
    }

    debug!("🛑 Poller schedule cancelled");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}

const STOPPED: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const STOPPING: u8 = 3;

/// Keeps the snapshot store fresh by fetching on a fixed interval.
///
/// Lifecycle changes are claimed by a compare-and-swap on the state word:
/// `Stopped → Starting → Running` and `Running → Stopping → Stopped`. A caller
/// that loses the swap returns at once, so duplicate or concurrent
/// `start`/`stop` calls are no-ops and at most one scheduling loop exists per
/// poller.
pub struct Poller {
    ctx: Arc<TickContext>,
    config: PollerConfig,
    state: AtomicU8,
    // Only written by the caller holding the `Starting`/`Stopping` claim.
    worker: Mutex<Option<Worker>>,
}

impl Poller {
    #[must_use]
    pub fn new(
        store: Arc<SnapshotStore>,
        fetcher: Arc<dyn FetchClient>,
        events: Arc<dyn EventSink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(TickContext {
                store,
                fetcher,
                events,
                ticks_succeeded: AtomicU64::new(0),
                ticks_failed: AtomicU64::new(0),
                last_tick_ok: AtomicBool::new(true),
            }),
            config,
            state: AtomicU8::new(STOPPED),
            worker: Mutex::new(None),
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Start periodic collection.
    ///
    /// Returns `false` if the poller was already running or another caller is
    /// mid-transition.
    ///
    /// # Panics
    ///
    /// Will panic if called outside a tokio runtime, since the schedule is a
    /// spawned task.
    pub fn start(&self) -> bool {
        if !self.claim(STOPPED, STARTING) {
            debug!("Poller already running");
            return false;
        }

        let worker = Worker::spawn(self.ctx.clone(), self.config.interval);
        *self.worker_slot() = Some(worker);
        self.state.store(RUNNING, Ordering::Release);

        info!(
            "Starting poller with {} second intervals",
            self.config.interval_secs()
        );
        true
    }

    /// Stop periodic collection, waiting up to the configured grace period
    /// for an in-flight tick.
    ///
    /// Returns `false` if the poller was already stopped.
    pub async fn stop(&self) -> bool {
        if !self.claim(RUNNING, STOPPING) {
            return false;
        }

        let worker = self.worker_slot().take();
        self.state.store(STOPPED, Ordering::Release);

        info!("Stopping poller...");
        if let Some(worker) = worker {
            worker.shutdown(self.config.stop_grace).await;
        }
        true
    }

    /// Queue one out-of-band tick without touching the schedule.
    ///
    /// Returns `false` (and does nothing) while stopped.
    pub fn force_update(&self) -> bool {
        let queued = self
            .worker_slot()
            .as_ref()
            .is_some_and(|worker| worker.force_tx.send(()).is_ok());

        if queued {
            info!("Forced cluster data update requested");
        } else {
            info!("Cannot force update - poller is not running");
        }
        queued
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.config.interval
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.ctx.store
    }

    /// False once the most recent tick failed, true again after the next
    /// success. True before the first tick.
    #[must_use]
    pub fn last_tick_ok(&self) -> bool {
        self.ctx.last_tick_ok.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn status(&self) -> PollerStatus {
        PollerStatus {
            cache: self.ctx.store.stats(),
            running: self.is_running(),
            interval_seconds: self.config.interval_secs(),
            ticks_succeeded: self.ctx.ticks_succeeded.load(Ordering::Relaxed),
            ticks_failed: self.ctx.ticks_failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(worker) = self.worker_slot().take() {
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetcher::FetchError;
    use crate::cache::snapshot::Snapshot;
    use crate::events::NoopEventSink;
    use async_trait::async_trait;
    use k8s_openapi::serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchClient for CountingFetcher {
        async fn fetch(&self) -> Result<Snapshot, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok([("n", json!(n))].into_iter().collect())
        }
    }

    fn poller(fetcher: Arc<CountingFetcher>, interval_secs: u64) -> Poller {
        Poller::new(
            Arc::new(SnapshotStore::new()),
            fetcher,
            Arc::new(NoopEventSink),
            PollerConfig::new(interval_secs, 10).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_initial_tick() {
        let fetcher = Arc::new(CountingFetcher::default());
        let poller = poller(fetcher.clone(), 30);

        assert!(poller.start());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(poller.store().is_valid());
        assert_eq!(poller.status().ticks_succeeded, 1);
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_update_while_stopped_is_noop() {
        let fetcher = Arc::new(CountingFetcher::default());
        let poller = poller(fetcher.clone(), 1);

        assert!(!poller.force_update());
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(!poller.store().is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_stopped_is_noop() {
        let poller = poller(Arc::new(CountingFetcher::default()), 1);
        assert!(!poller.stop().await);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_interval_and_state() {
        let poller = poller(Arc::new(CountingFetcher::default()), 7);
        let status = poller.status();
        assert!(!status.running);
        assert_eq!(status.interval_seconds, 7);
        assert!(!status.cache.valid);
    }

    /// Panics on its first call, then behaves.
    #[derive(Default)]
    struct PanicOnceFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchClient for PanicOnceFetcher {
        async fn fetch(&self) -> Result<Snapshot, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(n > 0, "api client blew up");
            Ok([("n", json!(n))].into_iter().collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_keeps_schedule_alive() {
        let fetcher = Arc::new(PanicOnceFetcher::default());
        let poller = Poller::new(
            Arc::new(SnapshotStore::new()),
            fetcher.clone(),
            Arc::new(NoopEventSink),
            PollerConfig::new(1, 10).unwrap(),
        );

        poller.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(poller.status().ticks_failed, 1);
        assert!(!poller.last_tick_ok());
        assert!(!poller.store().is_valid());
        assert!(poller.is_running());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(poller.status().ticks_succeeded, 1);
        assert!(poller.last_tick_ok());
        assert!(poller.store().is_valid());
        assert!(poller.force_update());
        assert!(poller.stop().await);
    }

    #[test]
    fn test_panic_message_from_payload() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("boom"));
        let borrowed: Box<dyn Any + Send> = Box::new("bang");
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(owned.as_ref()), "boom");
        assert_eq!(panic_message(borrowed.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
