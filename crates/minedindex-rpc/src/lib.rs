//! minedindex-rpc: JSON-RPC node client for MinedIndex.
//!
//! - [`client`]: `HttpNodeClient`, a [`minedindex_core::NodeClient`] over HTTP
//! - [`tips`]: polling new-tip subscription
//! - [`retry`]: exponential backoff for transient transport failures

pub mod client;
pub mod error;
pub mod request;
pub mod responses;
pub mod retry;
pub mod tips;

pub use client::{HttpNodeClient, NodeConfig};
pub use error::TransportError;
pub use tips::TipPoller;
