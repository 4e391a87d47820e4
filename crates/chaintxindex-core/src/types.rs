//! Shared types for the indexing pipeline.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── Node status ──────────────────────────────────────────────────────────────

/// The subset of the node's status report the indexer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Latest block height the node knows about. `0` while state-syncing.
    pub latest_block_height: u64,
}

/// A new-block-header event delivered by the node's push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockHeader {
    pub height: u64,
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// Block header fields carried through to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    /// Block hash (upper-case hex).
    pub hash: String,
    pub chain_id: String,
    /// RFC 3339 block time as reported by the node.
    pub time: String,
}

/// A raw transaction as included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// Transaction hash (upper-case hex SHA-256 of `bytes`).
    pub hash: String,
    pub bytes: Vec<u8>,
}

/// A finalized block: header plus its ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Tx>,
}

impl Block {
    pub fn height(&self) -> u64 {
        self.header.height
    }
}

// ─── Block results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// Event emitted by the EVM module for every Ethereum transaction.
pub const ETHEREUM_TX_EVENT: &str = "ethereum_tx";
/// Attribute of [`ETHEREUM_TX_EVENT`] carrying the Ethereum transaction hash.
pub const ETHEREUM_TX_HASH_ATTR: &str = "ethereumTxHash";

/// An event emitted while executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type (e.g. `"ethereum_tx"`, `"transfer"`).
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// First attribute value with the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Execution outcome of a single transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxResult {
    /// `0` on success.
    pub code: u32,
    pub log: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub events: Vec<Event>,
}

impl TxResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Ethereum hash of the first `ethereum_tx` event that carries one.
    pub fn ethereum_tx_hash(&self) -> Option<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == ETHEREUM_TX_EVENT)
            .find_map(|e| e.attribute(ETHEREUM_TX_HASH_ATTR))
            .filter(|h| !h.is_empty())
    }
}

/// Per-transaction execution results for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResults {
    pub height: u64,
    /// One entry per transaction, in block order.
    pub tx_results: Vec<TxResult>,
}

// ─── IndexedTx ────────────────────────────────────────────────────────────────

/// A transaction's position in the chain, as resolved by hash lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedTx {
    pub tx_hash: String,
    pub height: u64,
    /// Position of the transaction within its block.
    pub tx_index: u32,
    pub code: u32,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub success: bool,
    /// Execution log; the failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log: String,
    /// Hash of the wrapped Ethereum transaction, for EVM txs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_tx_hash: Option<String>,
}

impl IndexedTx {
    /// Pair each transaction of `block` with its execution result.
    ///
    /// Fails with [`IndexerError::ResultsMismatch`] if the counts differ.
    pub fn from_block(block: &Block, results: &BlockResults) -> Result<Vec<Self>, IndexerError> {
        if block.txs.len() != results.tx_results.len() {
            return Err(IndexerError::ResultsMismatch {
                height: block.height(),
                txs: block.txs.len(),
                results: results.tx_results.len(),
            });
        }
        Ok(block
            .txs
            .iter()
            .zip(&results.tx_results)
            .enumerate()
            .map(|(i, (tx, res))| IndexedTx {
                tx_hash: tx.hash.clone(),
                height: block.height(),
                tx_index: i as u32,
                code: res.code,
                gas_wanted: res.gas_wanted,
                gas_used: res.gas_used,
                success: res.is_success(),
                log: res.log.clone(),
                eth_tx_hash: res.ethereum_tx_hash().map(str::to_string),
            })
            .collect())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
