//! `NodeClient` implementation for CometBFT nodes.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use chaintxindex_core::client::{HeaderSubscription, NodeClient};
use chaintxindex_core::error::IndexerError;
use chaintxindex_core::types::{Block, BlockResults, NodeStatus};

use crate::http::HttpRpc;
use crate::jsonrpc::height_error;
use crate::wire::{parse_block, parse_block_results, parse_status};
use crate::ws;

/// Connection settings for a CometBFT node.
#[derive(Debug, Clone)]
pub struct CometClientConfig {
    /// HTTP JSON-RPC endpoint, e.g. `http://localhost:26657`.
    pub rpc_url: String,
    /// WebSocket endpoint. Derived from `rpc_url` when `None`.
    pub ws_url: Option<String>,
    pub request_timeout: Duration,
}

impl CometClientConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// `http://host:26657` → `ws://host:26657/websocket`.
pub fn derive_ws_url(rpc_url: &str) -> String {
    let base = rpc_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    if base.ends_with("/websocket") {
        base
    } else {
        format!("{base}/websocket")
    }
}

/// CometBFT client: HTTP for queries, WebSocket for the header subscription.
pub struct CometClient {
    http: HttpRpc,
    ws_url: String,
}

impl CometClient {
    pub fn new(config: CometClientConfig) -> Result<Self, IndexerError> {
        let ws_url = config
            .ws_url
            .unwrap_or_else(|| derive_ws_url(&config.rpc_url));
        Ok(Self {
            http: HttpRpc::new(config.rpc_url, config.request_timeout)?,
            ws_url,
        })
    }

    pub fn rpc_url(&self) -> &str {
        self.http.url()
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

#[async_trait]
impl NodeClient for CometClient {
    async fn status(&self) -> Result<NodeStatus, IndexerError> {
        let result = self
            .http
            .call("status", json!({}))
            .await?
            .map_err(|e| IndexerError::Rpc(e.detail()))?;
        parse_status(result)
    }

    async fn subscribe_new_block_headers(
        &self,
        subscriber: &str,
    ) -> Result<HeaderSubscription, IndexerError> {
        ws::subscribe_new_block_headers(&self.ws_url, subscriber).await
    }

    async fn block(&self, height: u64) -> Result<Block, IndexerError> {
        let result = self
            .http
            .call("block", json!({ "height": height.to_string() }))
            .await?
            .map_err(|e| height_error("block", height, e))?;
        parse_block(result)
    }

    async fn block_results(&self, height: u64) -> Result<BlockResults, IndexerError> {
        let result = self
            .http
            .call("block_results", json!({ "height": height.to_string() }))
            .await?
            .map_err(|e| height_error("block results", height, e))?;
        parse_block_results(result)
    }
}
