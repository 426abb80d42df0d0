//! Periodic snapshot refresh.
//!
//! One task owns the [`SeriesStore`] and the feed. Each cycle produces a new
//! immutable [`DashboardState`] that replaces the previous one wholesale and is
//! published on a `watch` channel. Fetches run one at a time inside the task,
//! so responses can never be applied out of order.

use crate::error::FeedError;
use crate::feed::PriceFeed;
use crate::models::SnapshotMap;
use crate::series_store::SeriesStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStatus {
    /// No fetch has succeeded yet.
    Loading,
    Loaded,
    /// Last attempt failed. Carries the user-facing message.
    Error(String),
}

/// Everything the presentation layer may read, as of one refresh cycle.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub status: RefreshStatus,
    pub snapshot: Arc<SnapshotMap>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Bumped on every transition.
    pub generation: u64,
}

impl DashboardState {
    pub fn initial() -> Self {
        Self {
            status: RefreshStatus::Loading,
            snapshot: Arc::new(SnapshotMap::new()),
            last_updated: None,
            generation: 0,
        }
    }

    pub fn loaded(&self, snapshot: SnapshotMap, at: DateTime<Utc>) -> Self {
        Self {
            status: RefreshStatus::Loaded,
            snapshot: Arc::new(snapshot),
            last_updated: Some(at),
            generation: self.generation + 1,
        }
    }

    /// Keeps the last good snapshot; only the status changes.
    pub fn failed(&self, message: String) -> Self {
        Self {
            status: RefreshStatus::Error(message),
            snapshot: Arc::clone(&self.snapshot),
            last_updated: self.last_updated,
            generation: self.generation + 1,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            RefreshStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::initial()
    }
}

// --- Single cycle ---

/// Fetch, then store update, then a new state record.
pub struct RefreshCycle {
    feed: Arc<dyn PriceFeed>,
    store: SeriesStore,
    state: DashboardState,
}

impl RefreshCycle {
    pub fn new(feed: Arc<dyn PriceFeed>, history_limit: usize) -> Self {
        Self {
            feed,
            store: SeriesStore::new(history_limit),
            state: DashboardState::initial(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub async fn refresh(&mut self) -> DashboardState {
        log::debug!("Fetching snapshot from {}", self.feed.endpoint());

        self.state = match self.feed.fetch_snapshot().await {
            Ok(snapshot) => {
                self.store.apply_snapshot(snapshot);
                let current = self.store.snapshot();
                for (asset_id, series) in current.iter() {
                    log::debug!("{asset_id}: {} samples", series.len());
                }
                self.state.loaded(current, Utc::now())
            }
            Err(e) => {
                log::warn!("Refresh failed: {e}");
                self.state.failed(FeedError::user_message(self.feed.endpoint()))
            }
        };
        self.state.clone()
    }
}

// --- Scheduled task ---

/// Cloneable out-of-band refresh request.
#[derive(Clone, Debug)]
pub struct RetryTrigger(Arc<Notify>);

impl RetryTrigger {
    /// Requests an immediate fetch. Presses during an in-flight fetch
    /// collapse into one follow-up attempt.
    pub fn fire(&self) {
        self.0.notify_one();
    }
}

/// Owning side of a running refresh task.
///
/// Dropping the handle aborts the task.
pub struct RefreshHandle {
    state_rx: watch::Receiver<Arc<DashboardState>>,
    retry: RetryTrigger,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub fn state(&self) -> Arc<DashboardState> {
        Arc::clone(&self.state_rx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardState>> {
        self.state_rx.clone()
    }

    pub fn retry(&self) {
        self.retry.fire();
    }

    pub fn retry_trigger(&self) -> RetryTrigger {
        self.retry.clone()
    }

    /// Cancels the task, including any fetch in flight, and waits for it.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        log::info!("Refresh task stopped");
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Starts refreshing immediately and then every `period`, forever, until the
/// handle is stopped or dropped. Failures never end the loop.
pub fn spawn_refresh_loop(feed: Arc<dyn PriceFeed>, period: Duration, history_limit: usize) -> RefreshHandle {
    let (state_tx, state_rx) = watch::channel(Arc::new(DashboardState::initial()));
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let notify = Arc::new(Notify::new());
    let retry = Arc::clone(&notify);

    log::info!("Refreshing from {} every {:?}", feed.endpoint(), period);
    let mut cycle = RefreshCycle::new(feed, history_limit);

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        // Ticks missed during a slow fetch are pushed back, not replayed.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {}
                _ = retry.notified() => log::debug!("Manual retry requested"),
            }

            let state = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                state = cycle.refresh() => state,
            };

            if state_tx.send(Arc::new(state)).is_err() {
                break;
            }
        }
    });

    RefreshHandle {
        state_rx,
        retry: RetryTrigger(notify),
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted outcomes; the last one repeats forever.
    struct ScriptedFeed {
        script: Mutex<VecDeque<Option<SnapshotMap>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Option<SnapshotMap>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceFeed for ScriptedFeed {
        async fn fetch_snapshot(&self) -> Result<SnapshotMap, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().cloned().flatten()
            };
            next.ok_or_else(|| FeedError::Status {
                url: "http://scripted/data".into(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            })
        }

        fn endpoint(&self) -> &str {
            "http://scripted"
        }
    }

    fn btc_eth_snapshot() -> SnapshotMap {
        let mut snapshot = SnapshotMap::new();
        snapshot.insert("BTC-USD", series("BTC-USD", &[(0, 100.0), (1, 110.0)]));
        snapshot.insert("ETH-USD", series("ETH-USD", &[(0, 2000.0)]));
        snapshot
    }

    #[test]
    fn transitions_replace_the_record() {
        let initial = DashboardState::initial();
        assert_eq!(initial.status, RefreshStatus::Loading);
        assert!(initial.snapshot.is_empty());

        let loaded = initial.loaded(btc_eth_snapshot(), at(5));
        assert_eq!(loaded.status, RefreshStatus::Loaded);
        assert_eq!(loaded.last_updated, Some(at(5)));
        assert_eq!(loaded.generation, 1);

        let failed = loaded.failed("down".into());
        assert_eq!(failed.error_message(), Some("down"));
        assert!(Arc::ptr_eq(&failed.snapshot, &loaded.snapshot));
        assert_eq!(failed.last_updated, Some(at(5)));
        assert_eq!(failed.generation, 2);

        let recovered = failed.loaded(SnapshotMap::new(), at(6));
        assert_eq!(recovered.error_message(), None);
        // The earlier record is untouched.
        assert_eq!(loaded.status, RefreshStatus::Loaded);
    }

    #[tokio::test]
    async fn failure_then_success_goes_loading_error_loaded() {
        let feed = ScriptedFeed::new(vec![None, Some(btc_eth_snapshot())]);
        let mut cycle = RefreshCycle::new(feed.clone(), 100);

        let mut statuses = vec![cycle.state().status.clone()];
        let errored = cycle.refresh().await;
        statuses.push(errored.status.clone());
        assert!(errored.snapshot.is_empty());
        assert!(cycle.store().get("BTC-USD").is_empty());

        let loaded = cycle.refresh().await;
        statuses.push(loaded.status.clone());

        assert_eq!(statuses[0], RefreshStatus::Loading);
        assert!(matches!(statuses[1], RefreshStatus::Error(_)));
        assert_eq!(statuses[2], RefreshStatus::Loaded);
        assert_eq!(*loaded.snapshot, btc_eth_snapshot());
    }

    #[tokio::test]
    async fn failure_keeps_previous_snapshot() {
        let feed = ScriptedFeed::new(vec![Some(btc_eth_snapshot()), None]);
        let mut cycle = RefreshCycle::new(feed, 100);

        let loaded = cycle.refresh().await;
        let failed = cycle.refresh().await;

        let msg = failed.error_message().unwrap();
        assert!(msg.contains("http://scripted"), "{msg}");
        assert!(!msg.contains("503"));
        assert_eq!(*failed.snapshot, *loaded.snapshot);
        assert_eq!(cycle.store().get("BTC-USD").prices(), vec![100.0, 110.0]);
        assert_eq!(failed.last_updated, loaded.last_updated);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_publishes_each_transition() {
        let feed = ScriptedFeed::new(vec![None, Some(btc_eth_snapshot())]);
        let handle = spawn_refresh_loop(feed.clone(), Duration::from_secs(1), 100);
        let mut rx = handle.subscribe();

        assert_eq!(handle.state().status, RefreshStatus::Loading);

        rx.changed().await.unwrap();
        assert!(matches!(rx.borrow_and_update().status, RefreshStatus::Error(_)));

        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.status, RefreshStatus::Loaded);
        assert_eq!(*state.snapshot, btc_eth_snapshot());
        assert_eq!(feed.calls(), 2);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_retrying_after_failures() {
        let feed = ScriptedFeed::new(vec![None]);
        let handle = spawn_refresh_loop(feed.clone(), Duration::from_secs(1), 100);

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(feed.calls() >= 4, "only {} attempts", feed.calls());
        assert!(handle.state().error_message().is_some());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fetches_without_waiting_for_the_period() {
        let feed = ScriptedFeed::new(vec![None, Some(btc_eth_snapshot())]);
        let handle = spawn_refresh_loop(feed.clone(), Duration::from_secs(3600), 100);
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().error_message().is_some());

        let started = tokio::time::Instant::now();
        handle.retry_trigger().fire();
        rx.changed().await.unwrap();

        assert_eq!(rx.borrow().status, RefreshStatus::Loaded);
        assert!(started.elapsed() < Duration::from_secs(1));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_loop_fetches_no_more() {
        let feed = ScriptedFeed::new(vec![Some(btc_eth_snapshot())]);
        let handle = spawn_refresh_loop(feed.clone(), Duration::from_secs(1), 100);
        let mut rx = handle.subscribe();
        rx.changed().await.unwrap();

        handle.stop().await;
        let calls = feed.calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(feed.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_cancels_the_task() {
        let feed = ScriptedFeed::new(vec![Some(btc_eth_snapshot())]);
        let handle = spawn_refresh_loop(feed.clone(), Duration::from_secs(1), 100);
        let mut rx = handle.subscribe();
        rx.changed().await.unwrap();

        drop(handle);
        let calls = feed.calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(feed.calls(), calls);
        // The sender went away with the task.
        assert!(rx.changed().await.is_err());
    }
}
