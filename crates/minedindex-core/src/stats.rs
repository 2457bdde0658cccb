//! Address statistics: the derived "blocks mined" counter per payee address.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Blocks attributed to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMinedRecord {
    pub address: String,
    pub blocks_mined: u64,
    /// Highest height already counted for this address.
    pub last_block_number: u64,
}

/// Storage for per-address mined-block counters.
///
/// `record_mined_block` is cumulative: every new height adds one to the
/// address's counter. A height at or below the record's
/// `last_block_number` was already counted and must leave the record
/// untouched, so a block reprocessed after a crash is never counted twice.
#[async_trait]
pub trait AddressStatsStore: Send + Sync {
    /// Create or bump the record for `address` with the block at `height`.
    async fn record_mined_block(&self, address: &str, height: u64) -> Result<(), IndexerError>;

    /// Look up one address.
    async fn get_address(&self, address: &str) -> Result<Option<AddressMinedRecord>, IndexerError>;

    /// Addresses with the most blocks mined, highest first.
    async fn top_miners(&self, limit: usize) -> Result<Vec<AddressMinedRecord>, IndexerError>;
}

/// Apply one attribution to an existing (or absent) record.
///
/// Returns `false` when the height was already counted.
pub fn apply_attribution(record: &mut AddressMinedRecord, height: u64) -> bool {
    if record.blocks_mined > 0 && height <= record.last_block_number {
        return false;
    }
    record.blocks_mined += 1;
    record.last_block_number = height;
    true
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory address statistics for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryAddressStatsStore {
    records: Mutex<HashMap<String, AddressMinedRecord>>,
}

impl MemoryAddressStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, AddressMinedRecord>>, IndexerError> {
        self.records
            .lock()
            .map_err(|_| IndexerError::Repository("address store poisoned".into()))
    }
}

#[async_trait]
impl AddressStatsStore for MemoryAddressStatsStore {
    async fn record_mined_block(&self, address: &str, height: u64) -> Result<(), IndexerError> {
        let mut rows = self.rows()?;
        let record = rows
            .entry(address.to_string())
            .or_insert_with(|| AddressMinedRecord {
                address: address.to_string(),
                blocks_mined: 0,
                last_block_number: 0,
            });
        apply_attribution(record, height);
        Ok(())
    }

    async fn get_address(&self, address: &str) -> Result<Option<AddressMinedRecord>, IndexerError> {
        Ok(self.rows()?.get(address).cloned())
    }

    async fn top_miners(&self, limit: usize) -> Result<Vec<AddressMinedRecord>, IndexerError> {
        let mut all: Vec<_> = self.rows()?.values().cloned().collect();
        all.sort_by(|a, b| {
            b.blocks_mined
                .cmp(&a.blocks_mined)
                .then_with(|| a.address.cmp(&b.address))
        });
        all.truncate(limit);
        Ok(all)
    }
}
