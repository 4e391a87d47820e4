//! HTTP JSON-RPC transport backed by `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;

use chaintxindex_core::error::IndexerError;

use crate::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// Outcome of one call: transport failures are already mapped, JSON-RPC
/// errors are left to the caller since their meaning depends on the method.
pub(crate) type CallResult = Result<Result<Value, JsonRpcError>, IndexerError>;

/// Plain HTTP JSON-RPC client. Failed heights are retried by the catch-up loop.
pub struct HttpRpc {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpc {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn call(&self, method: &str, params: Value) -> CallResult {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(RpcId::Number(id), method, params);

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(format!("{method}: {e}")))?;

        // CometBFT answers JSON-RPC errors with HTTP 500 and a JSON body, so
        // only give up on the status when the body is not JSON-RPC.
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IndexerError::Rpc(format!("{method}: {e}")))?;

        match serde_json::from_str::<JsonRpcResponse>(&body) {
            Ok(parsed) => Ok(parsed.into_result()),
            Err(_) if !status.is_success() => Err(IndexerError::Rpc(format!(
                "{method}: HTTP {}: {body}",
                status.as_u16()
            ))),
            Err(e) => Err(IndexerError::Rpc(format!("{method}: invalid response: {e}"))),
        }
    }
}
