//! Shared chain data types consumed by the processor.

use serde::{Deserialize, Serialize};

// ─── Node info ────────────────────────────────────────────────────────────────

/// The subset of the node's status the indexer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Height of the node's current tip.
    pub height: u64,
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as returned by the node, reduced to what payee detection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    /// Transaction ids in block order. The coinbase is always first.
    pub transaction_ids: Vec<String>,
}

impl Block {
    /// The id of the coinbase transaction, if the block carries any transaction.
    pub fn coinbase_txid(&self) -> Option<&str> {
        self.transaction_ids.first().map(String::as_str)
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// One output of a detailed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Destination address; `None` for non-standard or data outputs.
    pub address: Option<String>,
    /// Amount in smallest units.
    pub amount: u64,
}

/// A transaction with its outputs in serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub outputs: Vec<TxOutput>,
}
