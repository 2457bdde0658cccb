//! Checkpoint manager: persists how far an indexing job has progressed.
//!
//! One checkpoint row exists per job type. It is created once with an
//! idempotent "set if absent" call, read once at startup and then advanced
//! after every block whose processing fully succeeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// A persisted checkpoint for one indexing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Job type tag (e.g. `"BLOCKS_MINED"`).
    pub job_type: String,
    /// Last fully processed block height.
    pub last_block_number: u64,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Create the row for `job_type` at `initial` unless it already exists.
    async fn ensure_type(&self, job_type: &str, initial: u64) -> Result<(), IndexerError>;

    /// Load the checkpoint for `job_type`. Fails if the row is absent.
    async fn get(&self, job_type: &str) -> Result<Checkpoint, IndexerError>;

    /// Upsert the checkpoint for `job_type`.
    async fn set(&self, job_type: &str, height: u64) -> Result<(), IndexerError>;
}

/// Checkpoint reads/writes bound to a single job type.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    job_type: String,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, job_type: impl Into<String>) -> Self {
        Self {
            store,
            job_type: job_type.into(),
        }
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Make sure a row exists; never overwrites an existing value.
    pub async fn ensure(&self, initial: u64) -> Result<(), IndexerError> {
        self.store.ensure_type(&self.job_type, initial).await
    }

    /// The last fully processed height.
    pub async fn load(&self) -> Result<u64, IndexerError> {
        Ok(self.store.get(&self.job_type).await?.last_block_number)
    }

    /// Record `height` as fully processed.
    pub async fn advance(&self, height: u64) -> Result<(), IndexerError> {
        self.store.set(&self.job_type, height).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Checkpoint>>, IndexerError> {
        self.data
            .lock()
            .map_err(|_| IndexerError::Repository("checkpoint store poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn ensure_type(&self, job_type: &str, initial: u64) -> Result<(), IndexerError> {
        self.rows()?
            .entry(job_type.to_string())
            .or_insert_with(|| Checkpoint {
                job_type: job_type.to_string(),
                last_block_number: initial,
                updated_at: chrono::Utc::now().timestamp(),
            });
        Ok(())
    }

    async fn get(&self, job_type: &str) -> Result<Checkpoint, IndexerError> {
        self.rows()?
            .get(job_type)
            .cloned()
            .ok_or_else(|| IndexerError::Repository(format!("no checkpoint for type {job_type}")))
    }

    async fn set(&self, job_type: &str, height: u64) -> Result<(), IndexerError> {
        self.rows()?.insert(
            job_type.to_string(),
            Checkpoint {
                job_type: job_type.to_string(),
                last_block_number: height,
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_then_load() {
        let mgr = CheckpointManager::new(Arc::new(MemoryCheckpointStore::new()), "BLOCKS_MINED");
        mgr.ensure(0).await.unwrap();
        assert_eq!(mgr.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ensure_never_overwrites() {
        let mgr = CheckpointManager::new(Arc::new(MemoryCheckpointStore::new()), "BLOCKS_MINED");
        mgr.ensure(0).await.unwrap();
        mgr.advance(1200).await.unwrap();
        mgr.ensure(0).await.unwrap();
        assert_eq!(mgr.load().await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn load_missing_type_fails() {
        let mgr = CheckpointManager::new(Arc::new(MemoryCheckpointStore::new()), "BLOCKS_MINED");
        assert!(mgr.load().await.unwrap_err().is_repository());
    }

    #[tokio::test]
    async fn job_types_are_isolated() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let a = CheckpointManager::new(store.clone(), "A");
        let b = CheckpointManager::new(store, "B");
        a.ensure(5).await.unwrap();
        b.ensure(9).await.unwrap();
        a.advance(6).await.unwrap();
        assert_eq!(a.load().await.unwrap(), 6);
        assert_eq!(b.load().await.unwrap(), 9);
    }
}
