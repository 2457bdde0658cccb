//! Transport-level error types.

use minedindex_core::NodeError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// "Invalid address or key": unknown transaction.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
/// "Invalid parameter": block height out of range.
pub const RPC_INVALID_PARAMETER: i64 = -8;

/// Errors that can occur during an RPC call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, bad status, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

impl From<TransportError> for NodeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Rpc(err)
                if err.code == RPC_INVALID_ADDRESS_OR_KEY || err.code == RPC_INVALID_PARAMETER =>
            {
                NodeError::NotFound(err.message)
            }
            TransportError::Rpc(err) => NodeError::Rpc {
                code: err.code,
                message: err.message,
            },
            TransportError::Deserialization(err) => NodeError::Decode(err.to_string()),
            other => NodeError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64) -> TransportError {
        TransportError::Rpc(JsonRpcError {
            code,
            message: "boom".into(),
        })
    }

    #[test]
    fn unknown_objects_map_to_not_found() {
        assert!(NodeError::from(rpc(-8)).is_not_found());
        assert!(NodeError::from(rpc(-5)).is_not_found());
        assert!(matches!(NodeError::from(rpc(-28)), NodeError::Rpc { code: -28, .. }));
    }

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Http("refused".into()).is_retryable());
        assert!(TransportError::Timeout { ms: 10 }.is_retryable());
        assert!(!rpc(-1).is_retryable());
    }
}
