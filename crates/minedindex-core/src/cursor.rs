//! Indexer cursor: tracks the checkpointed height and the highest tip seen.

use serde::{Deserialize, Serialize};

/// The orchestrator's position in the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Last block that was fully processed.
    pub last_checked: u64,
    /// Highest tip height observed from any source.
    pub observed_tip: u64,
}

impl Cursor {
    /// Create a cursor resuming after `last_checked`.
    pub fn new(last_checked: u64) -> Self {
        Self {
            last_checked,
            observed_tip: 0,
        }
    }

    /// Fold a reported tip height in. Returns `true` if the tip moved forward.
    pub fn observe(&mut self, height: u64) -> bool {
        if height > self.observed_tip {
            self.observed_tip = height;
            true
        } else {
            false
        }
    }

    /// Record `height` as fully processed.
    pub fn advance(&mut self, height: u64) {
        self.last_checked = height;
    }

    /// The next block to process (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.last_checked + 1
    }

    /// Returns `true` if the observed tip is ahead of the checkpoint.
    pub fn is_behind(&self) -> bool {
        self.observed_tip > self.last_checked
    }
}
