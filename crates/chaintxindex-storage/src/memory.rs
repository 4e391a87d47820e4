//! In-memory storage backend.
//!
//! Keeps the hash → position map, the Ethereum hash → tx hash map and the
//! last indexed height in RAM.
//! Useful for testing and for nodes that rebuild the index on every start.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use chaintxindex_core::error::IndexerError;
use chaintxindex_core::store::{normalize_tx_hash, TxIndexStore, TxLookup};
use chaintxindex_core::types::{Block, BlockResults, IndexedTx};

use crate::IndexStatus;

#[derive(Default)]
struct Inner {
    txs: HashMap<String, IndexedTx>,
    eth_hashes: HashMap<String, String>,
    block_hashes: HashMap<u64, String>,
    last_indexed_height: Option<u64>,
    updated_at: Option<i64>,
}

/// In-memory transaction index.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryTxIndex {
    inner: Mutex<Inner>,
}

impl InMemoryTxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a cursor, as if `height` had been indexed by a prior run.
    pub fn with_last_indexed_height(height: u64) -> Self {
        let index = Self::default();
        index.lock().last_indexed_height = Some(height);
        index
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning leaves the maps valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hash of an indexed block.
    pub fn block_hash(&self, height: u64) -> Option<String> {
        self.lock().block_hashes.get(&height).cloned()
    }

    /// Number of distinct transactions indexed.
    pub fn tx_count(&self) -> usize {
        self.lock().txs.len()
    }

    pub fn status(&self) -> IndexStatus {
        let inner = self.lock();
        IndexStatus {
            last_indexed_height: inner.last_indexed_height,
            tx_count: inner.txs.len() as u64,
            updated_at: inner.updated_at,
        }
    }
}

#[async_trait]
impl TxIndexStore for InMemoryTxIndex {
    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError> {
        Ok(self.lock().last_indexed_height)
    }

    async fn index_block(&self, block: &Block, results: &BlockResults) -> Result<(), IndexerError> {
        let txs = IndexedTx::from_block(block, results)?;
        let height = block.height();

        let mut inner = self.lock();
        for tx in txs {
            let key = normalize_tx_hash(&tx.tx_hash);
            if let Some(eth) = &tx.eth_tx_hash {
                inner.eth_hashes.insert(normalize_tx_hash(eth), key.clone());
            }
            inner.txs.insert(key, tx);
        }
        inner.block_hashes.insert(height, block.header.hash.clone());
        inner.last_indexed_height = Some(inner.last_indexed_height.map_or(height, |h| h.max(height)));
        inner.updated_at = Some(chrono::Utc::now().timestamp());
        Ok(())
    }
}

#[async_trait]
impl TxLookup for InMemoryTxIndex {
    async fn tx_by_hash(&self, tx_hash: &str) -> Result<Option<IndexedTx>, IndexerError> {
        Ok(self.lock().txs.get(&normalize_tx_hash(tx_hash)).cloned())
    }

    async fn tx_by_eth_hash(&self, eth_hash: &str) -> Result<Option<IndexedTx>, IndexerError> {
        let inner = self.lock();
        Ok(inner
            .eth_hashes
            .get(&normalize_tx_hash(eth_hash))
            .and_then(|key| inner.txs.get(key))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaintxindex_core::types::{BlockHeader, Event, EventAttribute, Tx, TxResult};

    fn block(height: u64, hashes: &[&str]) -> (Block, BlockResults) {
        let block = Block {
            header: BlockHeader {
                height,
                hash: format!("B{height}"),
                chain_id: "kava_2222-10".into(),
                time: "2024-05-01T12:00:00Z".into(),
            },
            txs: hashes
                .iter()
                .map(|h| Tx {
                    hash: h.to_string(),
                    bytes: vec![1, 2, 3],
                })
                .collect(),
        };
        let results = BlockResults {
            height,
            tx_results: hashes
                .iter()
                .map(|_| TxResult {
                    gas_used: 50_000,
                    ..Default::default()
                })
                .collect(),
        };
        (block, results)
    }

    #[tokio::test]
    async fn empty_index_has_no_cursor() {
        let store = InMemoryTxIndex::new();
        assert_eq!(store.last_indexed_height().await.unwrap(), None);
        assert_eq!(store.status().tx_count, 0);
    }

    #[tokio::test]
    async fn index_and_lookup() {
        let store = InMemoryTxIndex::new();
        let (b, r) = block(100, &["AAAA", "BBBB"]);
        store.index_block(&b, &r).await.unwrap();

        let tx = store.tx_by_hash("0xbbbb").await.unwrap().unwrap();
        assert_eq!(tx.height, 100);
        assert_eq!(tx.tx_index, 1);
        assert!(tx.success);
        assert!(store.tx_by_hash("CCCC").await.unwrap().is_none());

        assert_eq!(store.last_indexed_height().await.unwrap(), Some(100));
        assert_eq!(store.block_hash(100).as_deref(), Some("B100"));
        assert!(store.status().updated_at.is_some());
    }

    #[tokio::test]
    async fn lookup_by_ethereum_hash() {
        let store = InMemoryTxIndex::new();
        let (b, mut r) = block(200, &["AAAA", "BBBB"]);
        r.tx_results[1].events.push(Event {
            kind: "ethereum_tx".into(),
            attributes: vec![EventAttribute {
                key: "ethereumTxHash".into(),
                value: "0xFeed01".into(),
            }],
        });
        store.index_block(&b, &r).await.unwrap();

        let tx = store.tx_by_eth_hash("0xfeed01").await.unwrap().unwrap();
        assert_eq!(tx.tx_hash, "BBBB");
        assert_eq!(tx.eth_tx_hash.as_deref(), Some("0xFeed01"));
        assert!(store.tx_by_eth_hash("0xfeed02").await.unwrap().is_none());
        // Cosmos hashes are not Ethereum hashes.
        assert!(store.tx_by_eth_hash("AAAA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reindexing_is_idempotent() {
        let store = InMemoryTxIndex::with_last_indexed_height(99);
        let (b, r) = block(100, &["AAAA"]);
        store.index_block(&b, &r).await.unwrap();
        store.index_block(&b, &r).await.unwrap();
        assert_eq!(store.tx_count(), 1);
        assert_eq!(store.last_indexed_height().await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn cursor_never_moves_back() {
        let store = InMemoryTxIndex::new();
        let (b7, r7) = block(7, &[]);
        let (b5, r5) = block(5, &[]);
        store.index_block(&b7, &r7).await.unwrap();
        store.index_block(&b5, &r5).await.unwrap();
        assert_eq!(store.last_indexed_height().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn mismatched_results_are_rejected() {
        let store = InMemoryTxIndex::new();
        let (b, mut r) = block(3, &["AAAA"]);
        r.tx_results.clear();
        let err = store.index_block(&b, &r).await.unwrap_err();
        assert!(matches!(err, IndexerError::ResultsMismatch { .. }));
        assert_eq!(store.last_indexed_height().await.unwrap(), None);
    }
}
