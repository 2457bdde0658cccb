//! Error types for the minedindex pipeline.

use thiserror::Error;

/// Errors returned by a [`NodeClient`](crate::node::NodeClient).
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node does not know the requested block or transaction.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node answered with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The request never produced a usable response (connection, timeout, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl NodeError {
    /// Returns `true` if the node reported the object as unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors that can occur while indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("failed to fetch block {height}: {reason}")]
    FetchBlock { height: u64, reason: String },

    #[error("failed to fetch transaction {txid}: {reason}")]
    FetchTransaction { txid: String, reason: String },

    #[error("repository error: {0}")]
    Repository(String),

    #[error("node error: {0}")]
    Node(String),

    #[error("startup failed: {0}")]
    Startup(Box<IndexerError>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("indexer stopped")]
    Stopped,
}

impl IndexerError {
    /// Wrap an error raised during initial setup.
    pub fn startup(inner: IndexerError) -> Self {
        match inner {
            already @ Self::Startup(_) => already,
            other => Self::Startup(Box::new(other)),
        }
    }

    /// Returns `true` if the error came from one of the repositories.
    pub fn is_repository(&self) -> bool {
        match self {
            Self::Repository(_) => true,
            Self::Startup(inner) => inner.is_repository(),
            _ => false,
        }
    }
}
