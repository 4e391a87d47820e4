//! chaintxindex-storage — transaction index backends for ChainTxIndex.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! Both implement [`TxIndexStore`](chaintxindex_core::TxIndexStore) for the
//! catch-up loop and [`TxLookup`](chaintxindex_core::TxLookup) for queries.

use serde::{Deserialize, Serialize};

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryTxIndex;

/// Summary of what an index holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Highest indexed height, `None` if empty.
    pub last_indexed_height: Option<u64>,
    /// Number of distinct transaction hashes indexed.
    pub tx_count: u64,
    /// Unix timestamp of the last successful `index_block`.
    pub updated_at: Option<i64>,
}
