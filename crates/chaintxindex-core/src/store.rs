//! Store traits — the contract between the catch-up loop and the transaction index.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{Block, BlockResults, IndexedTx};

/// The persistent transaction index as seen by the catch-up loop.
///
/// Implementations: `InMemoryTxIndex` and `SqliteTxIndex` in
/// `chaintxindex-storage`.
#[async_trait]
pub trait TxIndexStore: Send + Sync {
    /// Highest fully indexed height, or `None` if nothing was ever indexed.
    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError>;

    /// Index every transaction of `block` and record its height as the
    /// last indexed height.
    ///
    /// Indexing the same block twice must be harmless.
    async fn index_block(&self, block: &Block, results: &BlockResults) -> Result<(), IndexerError>;
}

/// Read side of the index, for query APIs.
#[async_trait]
pub trait TxLookup: Send + Sync {
    /// Resolve a transaction hash (hex, case-insensitive) to its position.
    async fn tx_by_hash(&self, tx_hash: &str) -> Result<Option<IndexedTx>, IndexerError>;

    /// Resolve the hash of a wrapped Ethereum transaction (hex,
    /// case-insensitive) to the Cosmos transaction that carried it.
    async fn tx_by_eth_hash(&self, eth_hash: &str) -> Result<Option<IndexedTx>, IndexerError>;
}

/// Canonical form of a transaction hash for keys: upper-case hex, no `0x`.
pub fn normalize_tx_hash(tx_hash: &str) -> String {
    let h = tx_hash
        .strip_prefix("0x")
        .or_else(|| tx_hash.strip_prefix("0X"))
        .unwrap_or(tx_hash);
    h.to_ascii_uppercase()
}
