//! minedindex-core: incremental "blocks mined per address" indexer.
//!
//! # Architecture
//!
//! ```text
//! node tip stream ──► TipNotifier ──► Indexer worker (one pass at a time)
//!                                          ├── Cursor            (checkpoint + observed tip)
//!                                          └── BlockProcessor
//!                                                ├── reward::subsidy_at   (payee threshold)
//!                                                ├── AddressStatsStore    (blocks mined per address)
//!                                                └── CheckpointManager    (crash recovery)
//! ```

pub mod checkpoint;
pub mod cursor;
pub mod error;
pub mod handler;
pub mod index_loop;
pub mod indexer;
pub mod node;
pub mod processor;
pub mod reward;
pub mod stats;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use cursor::Cursor;
pub use error::{IndexerError, NodeError};
pub use handler::PassObserver;
pub use index_loop::{Indexer, IndexerHandle, TipNotifier};
pub use indexer::{IndexerConfig, IndexerState, IndexerStatus, BLOCKS_MINED_JOB};
pub use node::{NodeClient, TipStream};
pub use processor::{detect_payee, BlockOutcome, BlockProcessor, PayeeThreshold};
pub use reward::{subsidy_at, COIN};
pub use stats::{AddressMinedRecord, AddressStatsStore, MemoryAddressStatsStore};
pub use types::{Block, NodeInfo, Transaction, TxOutput};
