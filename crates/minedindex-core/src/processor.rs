//! Block processor: attributes one block to its coinbase payee.
//!
//! For every height: fetch the block, fetch its coinbase transaction, pick
//! the payee with the subsidy-threshold heuristic, bump that address's
//! counter and finally advance the checkpoint. The address write and the
//! checkpoint write are not transactional; the address store ignores
//! heights it has already counted, so a block replayed after a crash
//! between the two writes is not counted twice.

use std::sync::Arc;

use tracing::debug;

use crate::checkpoint::CheckpointManager;
use crate::error::IndexerError;
use crate::indexer::IndexerConfig;
use crate::node::NodeClient;
use crate::reward::subsidy_at;
use crate::stats::AddressStatsStore;
use crate::types::TxOutput;

/// Result of processing a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub height: u64,
    /// Address credited with the block, if any output qualified.
    pub payee: Option<String>,
}

/// Fraction of the expected subsidy an output has to exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayeeThreshold {
    numerator: u64,
    denominator: u64,
}

impl PayeeThreshold {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, IndexerError> {
        if denominator == 0 {
            return Err(IndexerError::Config(
                "threshold_denominator must be non-zero".into(),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// `amount > subsidy * numerator / denominator`, without rounding.
    pub fn exceeded_by(&self, amount: u64, subsidy: u64) -> bool {
        (amount as u128) * (self.denominator as u128) > (subsidy as u128) * (self.numerator as u128)
    }
}

impl Default for PayeeThreshold {
    fn default() -> Self {
        Self {
            numerator: 6,
            denominator: 10,
        }
    }
}

/// Scan `outputs` in order and return the address of the last output whose
/// amount exceeds the threshold share of `subsidy`.
///
/// Amounts are smallest units while `subsidy` is the whole-coin value from
/// [`subsidy_at`]; the two are compared as plain numbers.
///
/// The last qualifying output wins even when it has no address, in which
/// case the block has no attributable payee.
pub fn detect_payee(outputs: &[TxOutput], subsidy: u64, threshold: PayeeThreshold) -> Option<&str> {
    outputs
        .iter()
        .rev()
        .find(|out| threshold.exceeded_by(out.amount, subsidy))
        .and_then(|out| out.address.as_deref())
}

/// Processes blocks one height at a time.
pub struct BlockProcessor {
    node: Arc<dyn NodeClient>,
    stats: Arc<dyn AddressStatsStore>,
    checkpoint: CheckpointManager,
    threshold: PayeeThreshold,
}

impl BlockProcessor {
    pub fn new(
        node: Arc<dyn NodeClient>,
        stats: Arc<dyn AddressStatsStore>,
        checkpoint: CheckpointManager,
        threshold: PayeeThreshold,
    ) -> Self {
        Self {
            node,
            stats,
            checkpoint,
            threshold,
        }
    }

    /// Build a processor using the threshold from `config`.
    pub fn from_config(
        config: &IndexerConfig,
        node: Arc<dyn NodeClient>,
        stats: Arc<dyn AddressStatsStore>,
        checkpoint: CheckpointManager,
    ) -> Result<Self, IndexerError> {
        let threshold =
            PayeeThreshold::new(config.threshold_numerator, config.threshold_denominator)?;
        Ok(Self::new(node, stats, checkpoint, threshold))
    }

    pub fn node(&self) -> &Arc<dyn NodeClient> {
        &self.node
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    /// Attribute the block at `height` and advance the checkpoint to it.
    ///
    /// The first failing step is returned as is; nothing is retried.
    pub async fn process_block(&self, height: u64) -> Result<BlockOutcome, IndexerError> {
        let block = self
            .node
            .get_block(height)
            .await
            .map_err(|e| IndexerError::FetchBlock {
                height,
                reason: e.to_string(),
            })?;

        let txid = block.coinbase_txid().ok_or_else(|| IndexerError::FetchBlock {
            height,
            reason: "block has no transactions".into(),
        })?;

        let coinbase = self
            .node
            .get_detailed_transaction(txid)
            .await
            .map_err(|e| IndexerError::FetchTransaction {
                txid: txid.to_string(),
                reason: e.to_string(),
            })?;

        let subsidy = subsidy_at(height);
        let payee = detect_payee(&coinbase.outputs, subsidy, self.threshold).map(str::to_string);

        match &payee {
            Some(address) => {
                self.stats.record_mined_block(address, height).await?;
                debug!(height, %address, subsidy, "block attributed");
            }
            None => debug!(height, subsidy, "no output above threshold"),
        }

        self.checkpoint.advance(height).await?;
        Ok(BlockOutcome { height, payee })
    }
}
