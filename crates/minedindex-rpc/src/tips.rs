//! Polling tip subscription.
//!
//! bitcoind-family nodes announce new blocks over ZMQ or `blocknotify`,
//! neither of which is reachable through JSON-RPC alone. The poller asks
//! for the block count on a fixed interval and emits every height that is
//! higher than the last one it emitted.

use std::sync::Arc;
use std::time::Duration;

use minedindex_core::{NodeClient, TipStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct TipPoller {
    source: Arc<dyn NodeClient>,
    interval: Duration,
}

impl TipPoller {
    pub fn new(source: Arc<dyn NodeClient>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Spawn the polling task. It stops once the returned stream is dropped.
    pub fn spawn(self) -> TipStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(tx));
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|height| (height, rx))
        }))
    }

    async fn run(self, tx: mpsc::UnboundedSender<u64>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_emitted: Option<u64> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => break,
            }
            match self.source.get_info().await {
                Ok(info) if last_emitted.map_or(true, |last| info.height > last) => {
                    last_emitted = Some(info.height);
                    if tx.send(info.height).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "tip poll failed"),
            }
        }
        debug!("tip poller stopped");
    }
}
