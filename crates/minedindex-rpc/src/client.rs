//! HTTP JSON-RPC node client backed by `reqwest`.
//!
//! Transient failures (connection errors, timeouts, bad HTTP status) are
//! retried with exponential backoff; node-side RPC errors are returned
//! immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use minedindex_core::{Block, NodeClient, NodeError, NodeInfo, TipStream, Transaction};

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::responses::{RawBlock, RawTransaction};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::tips::TipPoller;

/// Connection settings for the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON-RPC endpoint, e.g. `http://127.0.0.1:16124`.
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub request_timeout_ms: u64,
    /// How often the tip poller asks for the block count.
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:16124".into(),
            rpc_user: None,
            rpc_password: None,
            request_timeout_ms: 30_000,
            poll_interval_ms: 1_000,
            max_retries: 3,
            initial_backoff_ms: 100,
        }
    }
}

impl NodeConfig {
    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            ..RetryConfig::default()
        }
    }
}

/// JSON-RPC client for a bitcoind-family node.
#[derive(Clone)]
pub struct HttpNodeClient {
    url: String,
    auth: Option<(String, Option<String>)>,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    poll_interval: Duration,
    next_id: Arc<AtomicU64>,
}

impl HttpNodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self, TransportError> {
        if config.rpc_url.is_empty() {
            return Err(TransportError::Config("rpc_url must not be empty".into()));
        }
        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self {
            url: config.rpc_url.clone(),
            auth: config
                .rpc_user
                .clone()
                .map(|user| (user, config.rpc_password.clone())),
            http,
            retry: RetryPolicy::new(config.retry_config()),
            request_timeout,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut builder = self.http.post(&self.url).json(req);
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, password.as_ref());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    ms: self.request_timeout.as_millis() as u64,
                }
            } else {
                TransportError::Http(e.to_string())
            }
        })?;

        // bitcoind answers RPC errors with HTTP 404/500 and a JSON body.
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        match serde_json::from_str::<JsonRpcResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(TransportError::Http(format!(
                "HTTP {}: {body}",
                status.as_u16()
            ))),
            Err(e) => Err(TransportError::Deserialization(e)),
        }
    }

    /// Send a request, retrying transient failures.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            method = %req.method,
                            "retrying node request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            method = %req.method,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Call `method` and deserialize the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.send(JsonRpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn get_info(&self) -> Result<NodeInfo, NodeError> {
        let height: u64 = self.call("getblockcount", vec![]).await?;
        Ok(NodeInfo { height })
    }

    async fn get_block(&self, height: u64) -> Result<Block, NodeError> {
        let hash: Option<String> = self.call("getblockhash", vec![json!(height)]).await?;
        let hash = hash.ok_or_else(|| NodeError::NotFound(format!("block {height}")))?;
        let raw: Option<RawBlock> = self.call("getblock", vec![json!(hash), json!(1)]).await?;
        raw.map(Block::from)
            .ok_or_else(|| NodeError::NotFound(format!("block {height}")))
    }

    async fn get_detailed_transaction(&self, txid: &str) -> Result<Transaction, NodeError> {
        let raw: Option<RawTransaction> = self
            .call("getrawtransaction", vec![json!(txid), json!(1)])
            .await?;
        raw.map(Transaction::from)
            .ok_or_else(|| NodeError::NotFound(format!("transaction {txid}")))
    }

    async fn subscribe_tips(&self) -> Result<TipStream, NodeError> {
        let source: Arc<dyn NodeClient> = Arc::new(self.clone());
        Ok(TipPoller::new(source, self.poll_interval).spawn())
    }
}
