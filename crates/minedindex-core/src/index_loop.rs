//! The catch-up orchestrator.
//!
//! # Startup
//! Ensure the checkpoint row exists, load it, ask the node for its tip and
//! run one catch-up pass inline. Any failure aborts startup. Only then is
//! the node's tip stream subscribed.
//!
//! # Live
//! A single worker task owns the cursor and the block processor. Tip
//! notifications only fold their height into the shared observed tip and,
//! when no pass is running, wake the worker. The worker keeps running
//! passes until one ends with nothing left between the checkpoint and the
//! observed tip, then goes back to sleep. A failed pass is not retried;
//! the next notification starts a new attempt from the last checkpoint.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::handler::PassObserver;
use crate::indexer::{IndexerConfig, IndexerState, IndexerStatus};
use crate::node::TipStream;
use crate::processor::BlockProcessor;

/// State shared between the tip handler and the worker.
struct TipSignal {
    observed: AtomicU64,
    /// Reentrancy guard: set while the worker is draining.
    running: AtomicBool,
    /// Set by a notification that found the worker idle. Cleared when a
    /// drain starts, so permits left over from before it are ignored.
    wake_requested: AtomicBool,
    wake: Notify,
}

/// Cloneable entry point for new-tip notifications.
#[derive(Clone)]
pub struct TipNotifier {
    signal: Arc<TipSignal>,
}

impl TipNotifier {
    /// Fold `height` into the observed tip and wake the worker if it is idle.
    ///
    /// Never blocks and never drops a height. Returns `false` when a pass was
    /// already running; that pass picks the new tip up before it goes idle.
    pub fn notify_tip(&self, height: u64) -> bool {
        self.signal.observed.fetch_max(height, Ordering::SeqCst);
        if self.signal.running.load(Ordering::SeqCst) {
            return false;
        }
        self.signal.wake_requested.store(true, Ordering::SeqCst);
        self.signal.wake.notify_one();
        true
    }

    /// Highest tip height seen so far.
    pub fn observed_tip(&self) -> u64 {
        self.signal.observed.load(Ordering::SeqCst)
    }

    /// Returns `true` while a catch-up pass is executing.
    pub fn is_running(&self) -> bool {
        self.signal.running.load(Ordering::SeqCst)
    }
}

/// Owns the cursor and runs catch-up passes, one at a time.
struct Worker {
    processor: BlockProcessor,
    observer: Option<Arc<dyn PassObserver>>,
    cursor: Cursor,
    signal: Arc<TipSignal>,
    status: watch::Sender<IndexerStatus>,
}

impl Worker {
    fn publish(&self, state: IndexerState) {
        self.status.send_replace(IndexerStatus {
            state,
            last_checked: self.cursor.last_checked,
            observed_tip: self.cursor.observed_tip,
        });
    }

    /// Process `next_block..=target` in ascending order, stopping at the
    /// first failure with the cursor on the last good height.
    async fn catch_up(&mut self, target: u64) -> Result<(), IndexerError> {
        if target <= self.cursor.last_checked {
            return Ok(());
        }
        let from = self.cursor.next_block();
        info!(from, target, "catch-up pass started");
        self.publish(IndexerState::Running { target });

        for height in from..=target {
            let outcome = self.processor.process_block(height).await?;
            self.cursor.advance(outcome.height);
            self.publish(IndexerState::Running { target });
        }

        info!(last_checked = self.cursor.last_checked, "catch-up pass complete");
        if let Some(observer) = &self.observer {
            observer.on_pass_complete(self.cursor.last_checked).await?;
        }
        Ok(())
    }

    /// Run passes until the checkpoint reaches the observed tip, then clear
    /// the guard.
    async fn drain(&mut self) {
        self.signal.running.store(true, Ordering::SeqCst);
        self.signal.wake_requested.store(false, Ordering::SeqCst);
        loop {
            let target = self.signal.observed.load(Ordering::SeqCst);
            self.cursor.observe(target);

            if !self.cursor.is_behind() {
                self.signal.running.store(false, Ordering::SeqCst);
                // A tip may have landed after the load above but while the
                // guard was still set; its handler did not wake us.
                if self.signal.observed.load(Ordering::SeqCst) > self.cursor.last_checked {
                    self.signal.running.store(true, Ordering::SeqCst);
                    continue;
                }
                break;
            }

            if let Err(e) = self.catch_up(target).await {
                warn!(
                    error = %e,
                    last_checked = self.cursor.last_checked,
                    target,
                    "catch-up pass failed, waiting for the next tip"
                );
                self.signal.running.store(false, Ordering::SeqCst);
                break;
            }
        }
        self.publish(IndexerState::Idle);
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        'live: loop {
            self.drain().await;
            loop {
                tokio::select! {
                    _ = self.signal.wake.notified() => {}
                    _ = shutdown.changed() => break 'live,
                }
                if self.signal.wake_requested.swap(false, Ordering::SeqCst) {
                    break;
                }
            }
        }
        debug!(last_checked = self.cursor.last_checked, "indexer worker stopped");
        self.publish(IndexerState::Stopped);
    }
}

async fn forward_tips(
    mut tips: TipStream,
    notifier: TipNotifier,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = tips.next() => match next {
                Some(height) => {
                    debug!(height, "new tip");
                    notifier.notify_tip(height);
                }
                None => {
                    warn!("tip stream ended");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// The blocks-mined indexer, ready to be started.
pub struct Indexer {
    config: IndexerConfig,
    processor: BlockProcessor,
    observer: Option<Arc<dyn PassObserver>>,
}

impl Indexer {
    pub fn new(config: IndexerConfig, processor: BlockProcessor) -> Self {
        Self {
            config,
            processor,
            observer: None,
        }
    }

    /// Register a hook that runs after every successful pass.
    pub fn with_observer(mut self, observer: Arc<dyn PassObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run the startup protocol and spawn the live worker.
    ///
    /// Returns once the initial catch-up pass has finished. Any failure up to
    /// and including the tip subscription is wrapped in
    /// [`IndexerError::Startup`].
    pub async fn start(self) -> Result<IndexerHandle, IndexerError> {
        self.config.validate().map_err(IndexerError::startup)?;

        let checkpoint = self.processor.checkpoint().clone();
        let node = self.processor.node().clone();
        info!(job = checkpoint.job_type(), "indexer starting");

        checkpoint
            .ensure(self.config.initial_checkpoint)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to ensure checkpoint row");
                IndexerError::startup(e)
            })?;
        let last_checked = checkpoint.load().await.map_err(|e| {
            error!(error = %e, "failed to load checkpoint");
            IndexerError::startup(e)
        })?;

        let mut cursor = Cursor::new(last_checked);
        let info = node.get_info().await.map_err(|e| {
            error!(error = %e, "failed to query node info");
            IndexerError::startup(IndexerError::Node(e.to_string()))
        })?;
        cursor.observe(info.height);
        info!(last_checked, tip = cursor.observed_tip, "checkpoint loaded");

        let signal = Arc::new(TipSignal {
            observed: AtomicU64::new(cursor.observed_tip),
            running: AtomicBool::new(true),
            wake_requested: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let (status_tx, status_rx) = watch::channel(IndexerStatus {
            state: IndexerState::Starting,
            last_checked,
            observed_tip: cursor.observed_tip,
        });

        let mut worker = Worker {
            processor: self.processor,
            observer: self.observer,
            cursor,
            signal: signal.clone(),
            status: status_tx,
        };

        let target = worker.cursor.observed_tip;
        if let Err(e) = worker.catch_up(target).await {
            error!(
                error = %e,
                last_checked = worker.cursor.last_checked,
                "initial catch-up failed"
            );
            return Err(IndexerError::startup(e));
        }
        signal.running.store(false, Ordering::SeqCst);
        worker.publish(IndexerState::Idle);

        let tips = node.subscribe_tips().await.map_err(|e| {
            error!(error = %e, "failed to subscribe to tips");
            IndexerError::startup(IndexerError::Node(e.to_string()))
        })?;

        let notifier = TipNotifier { signal };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let forwarder = tokio::spawn(forward_tips(tips, notifier.clone(), shutdown_rx.clone()));
        let worker = tokio::spawn(worker.run(shutdown_rx));

        info!("indexer started");
        Ok(IndexerHandle {
            notifier,
            status: status_rx,
            shutdown: shutdown_tx,
            worker,
            forwarder,
        })
    }
}

/// Control handle for a running indexer. Dropping it stops the worker.
pub struct IndexerHandle {
    notifier: TipNotifier,
    status: watch::Receiver<IndexerStatus>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl IndexerHandle {
    /// A notifier that can be handed to other tip sources.
    pub fn notifier(&self) -> TipNotifier {
        self.notifier.clone()
    }

    /// Report a new tip height; see [`TipNotifier::notify_tip`].
    pub fn notify_tip(&self, height: u64) -> bool {
        self.notifier.notify_tip(height)
    }

    /// Latest published status.
    pub fn status(&self) -> IndexerStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<IndexerStatus> {
        self.status.clone()
    }

    /// Wait until the worker is idle with the checkpoint at or past `height`.
    pub async fn wait_until_caught_up(&self, height: u64) -> Result<IndexerStatus, IndexerError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| {
                s.state == IndexerState::Stopped
                    || (s.state == IndexerState::Idle && s.last_checked >= height)
            })
            .await
            .map_err(|_| IndexerError::Stopped)?;
        if status.state == IndexerState::Stopped {
            return Err(IndexerError::Stopped);
        }
        Ok(*status)
    }

    /// Stop after any in-flight pass completes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "indexer worker panicked");
        }
        if let Err(e) = self.forwarder.await {
            warn!(error = %e, "tip forwarder panicked");
        }
        info!("indexer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointManager, CheckpointStore, MemoryCheckpointStore};
    use crate::processor::tests::MockNode;
    use crate::processor::PayeeThreshold;
    use crate::stats::{AddressStatsStore, MemoryAddressStatsStore};
    use async_trait::async_trait;
    use std::time::Duration;

    const JOB: &str = "BLOCKS_MINED";

    struct Harness {
        node: Arc<MockNode>,
        stats: Arc<MemoryAddressStatsStore>,
        checkpoints: Arc<MemoryCheckpointStore>,
    }

    impl Harness {
        fn new(tip: u64) -> Self {
            Self {
                node: Arc::new(MockNode::with_tip(tip)),
                stats: Arc::new(MemoryAddressStatsStore::new()),
                checkpoints: Arc::new(MemoryCheckpointStore::new()),
            }
        }

        fn indexer(&self) -> Indexer {
            let processor = BlockProcessor::new(
                self.node.clone(),
                self.stats.clone(),
                CheckpointManager::new(self.checkpoints.clone(), JOB),
                PayeeThreshold::default(),
            );
            Indexer::new(IndexerConfig::default(), processor)
        }

        async fn checkpoint(&self) -> u64 {
            self.checkpoints.get(JOB).await.unwrap().last_block_number
        }
    }

    async fn caught_up(handle: &IndexerHandle, height: u64) -> IndexerStatus {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_until_caught_up(height))
            .await
            .expect("indexer did not converge")
            .unwrap()
    }

    #[tokio::test]
    async fn startup_catches_up_to_node_tip() {
        let h = Harness::new(5);
        let handle = h.indexer().start().await.unwrap();

        assert_eq!(handle.status().last_checked, 5);
        assert_eq!(h.checkpoint().await, 5);
        assert_eq!(h.node.fetched(), vec![1, 2, 3, 4, 5]);
        assert_eq!(h.stats.top_miners(10).await.unwrap().len(), 5);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn resumes_from_existing_checkpoint() {
        let h = Harness::new(6);
        h.checkpoints.set(JOB, 3).await.unwrap();
        let handle = h.indexer().start().await.unwrap();

        assert_eq!(h.node.fetched(), vec![4, 5, 6]);
        assert_eq!(h.checkpoint().await, 6);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn startup_failure_keeps_last_good_height() {
        let h = Harness::new(5);
        h.node.failing_blocks.lock().unwrap().insert(3);

        let err = h.indexer().start().await.err().unwrap();
        match err {
            IndexerError::Startup(inner) => {
                assert!(matches!(*inner, IndexerError::FetchBlock { height: 3, .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.checkpoint().await, 2);
        assert_eq!(h.node.fetched(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn tip_stream_drives_new_passes() {
        let h = Harness::new(2);
        let tips = h.node.tip_channel();
        let handle = h.indexer().start().await.unwrap();

        h.node.set_tip(10);
        tips.send(10).unwrap();
        let status = caught_up(&handle, 10).await;

        assert_eq!(status.last_checked, 10);
        assert_eq!(h.checkpoint().await, 10);
        assert_eq!(h.node.fetched(), (1..=10).collect::<Vec<_>>());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn burst_during_pass_converges_without_overlap() {
        let h = Harness::new(1);
        h.node.delay_ms.store(2, std::sync::atomic::Ordering::SeqCst);
        let handle = h.indexer().start().await.unwrap();

        h.node.set_tip(30);
        let mut senders = Vec::new();
        for height in 2..=30 {
            let notifier = handle.notifier();
            senders.push(tokio::spawn(async move {
                notifier.notify_tip(height);
            }));
        }
        for s in senders {
            s.await.unwrap();
        }

        let status = caught_up(&handle, 30).await;
        assert_eq!(status.observed_tip, 30);
        assert_eq!(h.checkpoint().await, 30);
        assert_eq!(h.node.fetched(), (1..=30).collect::<Vec<_>>());
        assert_eq!(h.node.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!handle.notifier().is_running());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn notification_during_running_pass_is_not_lost() {
        let h = Harness::new(1);
        h.node.delay_ms.store(50, std::sync::atomic::Ordering::SeqCst);
        let handle = h.indexer().start().await.unwrap();

        h.node.set_tip(4);
        assert!(handle.notify_tip(3));
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.state.is_running()).await.unwrap();
        assert!(!handle.notify_tip(4));

        let status = caught_up(&handle, 4).await;
        assert_eq!(status.last_checked, 4);
        assert_eq!(h.node.fetched(), vec![1, 2, 3, 4]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn failed_pass_stops_and_next_tip_resumes() {
        let h = Harness::new(1);
        let handle = h.indexer().start().await.unwrap();

        h.node.failing_blocks.lock().unwrap().insert(3);
        h.node.set_tip(5);
        handle.notify_tip(5);

        let mut rx = handle.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.state == IndexerState::Idle && s.last_checked == 2),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(h.checkpoint().await, 2);
        assert!(!handle.notifier().is_running());

        h.node.failing_blocks.lock().unwrap().clear();
        assert!(handle.notify_tip(5));
        caught_up(&handle, 5).await;

        assert_eq!(h.checkpoint().await, 5);
        assert_eq!(h.node.fetched(), vec![1, 2, 3, 3, 4, 5]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn stale_and_duplicate_tips_are_harmless() {
        let h = Harness::new(3);
        let handle = h.indexer().start().await.unwrap();

        handle.notify_tip(3);
        handle.notify_tip(1);
        handle.notify_tip(0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = caught_up(&handle, 3).await;
        assert_eq!(status.observed_tip, 3);
        assert_eq!(h.node.fetched(), vec![1, 2, 3]);
        handle.shutdown().await;
    }

    struct CountingObserver(std::sync::Mutex<Vec<u64>>);

    #[async_trait]
    impl PassObserver for CountingObserver {
        async fn on_pass_complete(&self, last_checked: u64) -> Result<(), IndexerError> {
            self.0.lock().unwrap().push(last_checked);
            Ok(())
        }
    }

    #[tokio::test]
    async fn observer_runs_after_each_pass() {
        let h = Harness::new(2);
        let observer = Arc::new(CountingObserver(std::sync::Mutex::new(vec![])));
        let handle = h
            .indexer()
            .with_observer(observer.clone())
            .start()
            .await
            .unwrap();

        h.node.set_tip(4);
        handle.notify_tip(4);
        caught_up(&handle, 4).await;

        assert_eq!(*observer.0.lock().unwrap(), vec![2, 4]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_publishes_stopped() {
        let h = Harness::new(1);
        let handle = h.indexer().start().await.unwrap();
        let rx = handle.subscribe();
        handle.shutdown().await;
        assert_eq!(rx.borrow().state, IndexerState::Stopped);
    }
}
