//! JSON-RPC 2.0 wire types as spoken by CometBFT.
//!
//! CometBFT takes named parameters (a JSON object) and encodes 64-bit
//! integers as decimal strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chaintxindex_core::error::IndexerError;

/// JSON-RPC request ID: string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
}

/// A JSON-RPC 2.0 request with named parameters.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(id: RpcId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object. CometBFT puts the useful detail in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// `message` plus `data`, the way CometBFT clients print it.
    pub fn detail(&self) -> String {
        match &self.data {
            Some(Value::String(d)) => format!("{} ({}): {d}", self.message, self.code),
            Some(d) => format!("{} ({}): {d}", self.message, self.code),
            None => format!("{} ({})", self.message, self.code),
        }
    }

    /// The node has not reached `height` yet.
    pub fn is_height_too_high(&self) -> bool {
        self.detail()
            .contains("must be less than or equal to the current blockchain height")
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<RpcId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Map a JSON-RPC error for a height-addressed call.
pub(crate) fn height_error(what: &'static str, height: u64, err: JsonRpcError) -> IndexerError {
    if err.is_height_too_high() {
        IndexerError::NotFound { what, height }
    } else {
        IndexerError::Rpc(err.detail())
    }
}
