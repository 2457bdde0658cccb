//! The node collaborator: block and transaction retrieval plus tip notifications.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::NodeError;
use crate::types::{Block, NodeInfo, Transaction};

/// Stream of tip heights announced by the node.
///
/// Heights are non-decreasing in practice, but duplicates and slightly
/// out-of-order values must be tolerated by consumers.
pub type TipStream = Pin<Box<dyn Stream<Item = u64> + Send>>;

/// Abstracts over the node RPC backend.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Current node status, including the tip height.
    async fn get_info(&self) -> Result<NodeInfo, NodeError>;

    /// Block at `height`. Fails with [`NodeError::NotFound`] for unknown heights.
    async fn get_block(&self, height: u64) -> Result<Block, NodeError>;

    /// Detailed transaction with resolved output addresses and amounts.
    async fn get_detailed_transaction(&self, txid: &str) -> Result<Transaction, NodeError>;

    /// Start receiving new-tip notifications.
    async fn subscribe_tips(&self) -> Result<TipStream, NodeError>;
}
