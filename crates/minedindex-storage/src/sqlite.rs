//! SQLite storage backend for MinedIndex.
//!
//! Persists the per-job checkpoints and the per-address blocks-mined
//! counters in a single SQLite file, WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use minedindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./minedindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use minedindex_core::checkpoint::{Checkpoint, CheckpointStore};
use minedindex_core::error::IndexerError;
use minedindex_core::stats::{AddressMinedRecord, AddressStatsStore};

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Repository(e.to_string())
}

/// SQLite-backed checkpoint and address statistics storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./minedindex.db"`) or a full
    /// SQLite URL (`"sqlite:./minedindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection: every connection to `:memory:` is a
    /// separate database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS last_blocks (
                type              TEXT    PRIMARY KEY,
                last_block_number INTEGER NOT NULL,
                updated_at        INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS address_blocks_mined (
                address           TEXT    PRIMARY KEY,
                blocks_mined      INTEGER NOT NULL,
                last_block_number INTEGER NOT NULL,
                updated_at        INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_blocks_mined
             ON address_blocks_mined (blocks_mined DESC);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Every checkpoint row, ordered by type.
    pub async fn checkpoints(&self) -> Result<Vec<Checkpoint>, IndexerError> {
        let rows = sqlx::query(
            "SELECT type, last_block_number, updated_at FROM last_blocks ORDER BY type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(checkpoint_from_row).collect())
    }

    /// Number of addresses with at least one block attributed.
    pub async fn address_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM address_blocks_mined")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

fn checkpoint_from_row(row: &sqlx::sqlite::SqliteRow) -> Checkpoint {
    Checkpoint {
        job_type: row.get("type"),
        last_block_number: row.get::<i64, _>("last_block_number") as u64,
        updated_at: row.get("updated_at"),
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> AddressMinedRecord {
    AddressMinedRecord {
        address: row.get("address"),
        blocks_mined: row.get::<i64, _>("blocks_mined") as u64,
        last_block_number: row.get::<i64, _>("last_block_number") as u64,
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn ensure_type(&self, job_type: &str, initial: u64) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR IGNORE INTO last_blocks (type, last_block_number, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(job_type)
        .bind(initial as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, job_type: &str) -> Result<Checkpoint, IndexerError> {
        let row = sqlx::query(
            "SELECT type, last_block_number, updated_at FROM last_blocks WHERE type = ?",
        )
        .bind(job_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.as_ref()
            .map(checkpoint_from_row)
            .ok_or_else(|| IndexerError::Repository(format!("no checkpoint for type {job_type}")))
    }

    async fn set(&self, job_type: &str, height: u64) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO last_blocks (type, last_block_number, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(type) DO UPDATE SET
                 last_block_number = excluded.last_block_number,
                 updated_at        = excluded.updated_at",
        )
        .bind(job_type)
        .bind(height as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(job_type, height, "checkpoint saved");
        Ok(())
    }
}

// ─── AddressStatsStore impl ──────────────────────────────────────────────────

#[async_trait]
impl AddressStatsStore for SqliteStorage {
    async fn record_mined_block(&self, address: &str, height: u64) -> Result<(), IndexerError> {
        let result = sqlx::query(
            "INSERT INTO address_blocks_mined (address, blocks_mined, last_block_number, updated_at)
             VALUES (?, 1, ?, ?)
             ON CONFLICT(address) DO UPDATE SET
                 blocks_mined      = blocks_mined + 1,
                 last_block_number = excluded.last_block_number,
                 updated_at        = excluded.updated_at
             WHERE excluded.last_block_number > address_blocks_mined.last_block_number",
        )
        .bind(address)
        .bind(height as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            debug!(address, height, "height already counted");
        }
        Ok(())
    }

    async fn get_address(&self, address: &str) -> Result<Option<AddressMinedRecord>, IndexerError> {
        let row = sqlx::query(
            "SELECT address, blocks_mined, last_block_number
             FROM address_blocks_mined WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn top_miners(&self, limit: usize) -> Result<Vec<AddressMinedRecord>, IndexerError> {
        let rows = sqlx::query(
            "SELECT address, blocks_mined, last_block_number
             FROM address_blocks_mined
             ORDER BY blocks_mined DESC, address ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── CheckpointStore ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_creates_row_once() {
        let store = SqliteStorage::in_memory().await.unwrap();

        store.ensure_type("BLOCKS_MINED", 0).await.unwrap();
        store.set("BLOCKS_MINED", 1_500).await.unwrap();
        store.ensure_type("BLOCKS_MINED", 0).await.unwrap();

        let cp = store.get("BLOCKS_MINED").await.unwrap();
        assert_eq!(cp.last_block_number, 1_500);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_an_error() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let err = store.get("UNKNOWN").await.unwrap_err();
        assert!(err.is_repository());
    }

    #[tokio::test]
    async fn checkpoint_types_are_isolated() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.ensure_type("BLOCKS_MINED", 0).await.unwrap();
        store.ensure_type("OTHER", 42).await.unwrap();
        store.set("BLOCKS_MINED", 7).await.unwrap();

        let all = store.checkpoints().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].job_type, "BLOCKS_MINED");
        assert_eq!(all[0].last_block_number, 7);
        assert_eq!(all[1].last_block_number, 42);
    }

    // ── AddressStatsStore ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn mined_blocks_accumulate() {
        let store = SqliteStorage::in_memory().await.unwrap();

        store.record_mined_block("t1pool", 100).await.unwrap();
        store.record_mined_block("t1pool", 101).await.unwrap();
        store.record_mined_block("t1solo", 102).await.unwrap();

        let pool = store.get_address("t1pool").await.unwrap().unwrap();
        assert_eq!(pool.blocks_mined, 2);
        assert_eq!(pool.last_block_number, 101);
        assert_eq!(store.address_count().await.unwrap(), 2);
        assert!(store.get_address("t1nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replayed_height_is_ignored() {
        let store = SqliteStorage::in_memory().await.unwrap();

        store.record_mined_block("t1pool", 100).await.unwrap();
        store.record_mined_block("t1pool", 100).await.unwrap();
        store.record_mined_block("t1pool", 99).await.unwrap();

        let pool = store.get_address("t1pool").await.unwrap().unwrap();
        assert_eq!(pool.blocks_mined, 1);
        assert_eq!(pool.last_block_number, 100);
    }

    #[tokio::test]
    async fn top_miners_ordering_and_limit() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for h in 1..=3 {
            store.record_mined_block("b", h).await.unwrap();
        }
        store.record_mined_block("a", 4).await.unwrap();
        store.record_mined_block("c", 5).await.unwrap();

        let top = store.top_miners(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].address, "b");
        assert_eq!(top[0].blocks_mined, 3);
        assert_eq!(top[1].address, "a");
    }

    fn temp_db_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!(
                "minedindex-{tag}-{}-{}.db",
                std::process::id(),
                chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ))
            .to_string_lossy()
            .to_string()
    }

    fn remove_db(path: &str) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path}{suffix}"));
        }
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let path_str = temp_db_path("reopen");

        {
            let store = SqliteStorage::open(&path_str).await.unwrap();
            store.ensure_type("BLOCKS_MINED", 0).await.unwrap();
            store.set("BLOCKS_MINED", 321).await.unwrap();
            store.record_mined_block("t1pool", 321).await.unwrap();
            store.pool.close().await;
        }

        let store = SqliteStorage::open(&path_str).await.unwrap();
        assert_eq!(store.get("BLOCKS_MINED").await.unwrap().last_block_number, 321);
        assert_eq!(store.get_address("t1pool").await.unwrap().unwrap().blocks_mined, 1);
        store.pool.close().await;
        remove_db(&path_str);
    }

    // ── Indexer restart ───────────────────────────────────────────────────────

    mod restart {
        use super::*;
        use std::sync::{Arc, Mutex};

        use minedindex_core::{
            subsidy_at, Block, BlockProcessor, CheckpointManager, Indexer, IndexerConfig,
            NodeClient, NodeError, NodeInfo, PayeeThreshold, TipStream, Transaction, TxOutput,
            BLOCKS_MINED_JOB, COIN,
        };

        /// Chain of `tip` blocks, each paying its full subsidy to `miner-<height>`.
        struct FixedChain {
            tip: u64,
            fetched: Mutex<Vec<u64>>,
        }

        impl FixedChain {
            fn new(tip: u64) -> Arc<Self> {
                Arc::new(Self {
                    tip,
                    fetched: Mutex::new(Vec::new()),
                })
            }

            fn fetched(&self) -> Vec<u64> {
                self.fetched.lock().unwrap().clone()
            }
        }

        #[async_trait]
        impl NodeClient for FixedChain {
            async fn get_info(&self) -> Result<NodeInfo, NodeError> {
                Ok(NodeInfo { height: self.tip })
            }

            async fn get_block(&self, height: u64) -> Result<Block, NodeError> {
                self.fetched.lock().unwrap().push(height);
                if height > self.tip {
                    return Err(NodeError::NotFound(format!("block {height}")));
                }
                Ok(Block {
                    height,
                    transaction_ids: vec![format!("cb-{height}")],
                })
            }

            async fn get_detailed_transaction(&self, txid: &str) -> Result<Transaction, NodeError> {
                let height: u64 = txid
                    .trim_start_matches("cb-")
                    .parse()
                    .map_err(|_| NodeError::NotFound(txid.to_string()))?;
                Ok(Transaction {
                    outputs: vec![TxOutput {
                        address: Some(format!("miner-{height}")),
                        amount: subsidy_at(height) * COIN,
                    }],
                })
            }

            async fn subscribe_tips(&self) -> Result<TipStream, NodeError> {
                Ok(Box::pin(futures::stream::pending()))
            }
        }

        async fn run_once(path: &str, node: Arc<FixedChain>) -> SqliteStorage {
            let storage = Arc::new(SqliteStorage::open(path).await.unwrap());
            let processor = BlockProcessor::new(
                node,
                storage.clone(),
                CheckpointManager::new(storage.clone(), BLOCKS_MINED_JOB),
                PayeeThreshold::default(),
            );
            let handle = Indexer::new(IndexerConfig::default(), processor)
                .start()
                .await
                .unwrap();
            handle.shutdown().await;
            SqliteStorage::clone(&storage)
        }

        #[tokio::test]
        async fn second_start_resumes_from_persisted_checkpoint() {
            let path = temp_db_path("restart");

            let first = FixedChain::new(3);
            let store = run_once(&path, first.clone()).await;
            assert_eq!(first.fetched(), vec![1, 2, 3]);
            store.pool.close().await;

            let second = FixedChain::new(5);
            let store = run_once(&path, second.clone()).await;
            assert_eq!(second.fetched(), vec![4, 5]);
            assert_eq!(store.get(BLOCKS_MINED_JOB).await.unwrap().last_block_number, 5);
            assert_eq!(store.address_count().await.unwrap(), 5);
            assert_eq!(
                store.get_address("miner-2").await.unwrap().unwrap().blocks_mined,
                1
            );
            store.pool.close().await;

            remove_db(&path);
        }
    }
}
