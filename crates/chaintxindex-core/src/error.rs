//! Error types for the chaintxindex pipeline.

use thiserror::Error;

/// Errors that can occur while following the chain and indexing blocks.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Transport-level failure talking to the node (connection, HTTP, JSON-RPC).
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node does not (yet) have the requested data.
    #[error("{what} not found at height {height}")]
    NotFound { what: &'static str, height: u64 },

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The node answered but reported a zero height (state sync in progress).
    #[error("node isn't ready, possibly in state sync process (height {height})")]
    NodeNotReady { height: u64 },

    #[error("node not ready after {elapsed_ms}ms: {last_error}")]
    ReadinessTimeout { elapsed_ms: u64, last_error: String },

    /// Block or results came back labelled with another height.
    #[error("height mismatch at {expected}: block reports {block}, results report {results}")]
    HeightMismatch {
        expected: u64,
        block: u64,
        results: u64,
    },

    #[error("block {height} has {txs} transactions but {results} results")]
    ResultsMismatch {
        height: u64,
        txs: usize,
        results: usize,
    },

    #[error("height notifier stopped: {reason}")]
    NotifierStopped { reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error must stop the service.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReadinessTimeout { .. }
                | Self::Subscription(_)
                | Self::NotifierStopped { .. }
                | Self::HeightMismatch { .. }
                | Self::Config(_)
                | Self::Aborted { .. }
        )
    }
}
