//! SQLite storage backend for ChainTxIndex.
//!
//! Persists the transaction index, per-block metadata and the last indexed
//! height to a single SQLite file. Each block is written in one transaction,
//! so a crash never leaves half a block behind the cursor.
//!
//! # Usage
//! ```rust,no_run
//! use chaintxindex_storage::sqlite::SqliteTxIndex;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteTxIndex::open("./txindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteTxIndex::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chaintxindex_core::error::IndexerError;
use chaintxindex_core::store::{normalize_tx_hash, TxIndexStore, TxLookup};
use chaintxindex_core::types::{Block, BlockResults, IndexedTx};

use crate::IndexStatus;

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed transaction index.
pub struct SqliteTxIndex {
    pool: SqlitePool,
}

impl SqliteTxIndex {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./txindex.db"`) or a full
    /// SQLite URL (`"sqlite:./txindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Single connection: every pooled connection to `:memory:` would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS txs (
                tx_hash  TEXT    PRIMARY KEY,
                height   INTEGER NOT NULL,
                tx_index INTEGER NOT NULL,
                code        INTEGER NOT NULL,
                gas_wanted  INTEGER NOT NULL,
                gas_used    INTEGER NOT NULL,
                success     INTEGER NOT NULL,
                log         TEXT    NOT NULL,
                eth_tx_hash TEXT,
                eth_key     TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                height   INTEGER PRIMARY KEY,
                hash     TEXT    NOT NULL,
                time     TEXT    NOT NULL,
                tx_count INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // Single-row table holding the cursor.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                id                  INTEGER PRIMARY KEY CHECK (id = 0),
                last_indexed_height INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_txs_height ON txs (height);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_txs_eth_hash ON txs (eth_key);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    /// Look up the hash of an indexed block.
    pub async fn block_hash(&self, height: u64) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query("SELECT hash FROM blocks WHERE height = ?")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<String, _>("hash")))
    }

    /// All transactions of an indexed block, in block order.
    pub async fn txs_at_height(&self, height: u64) -> Result<Vec<IndexedTx>, IndexerError> {
        let rows = sqlx::query(
            "SELECT tx_hash, height, tx_index, code, gas_wanted, gas_used, success, log, eth_tx_hash
             FROM txs WHERE height = ? ORDER BY tx_index",
        )
        .bind(height as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(tx_from_row).collect())
    }

    pub async fn status(&self) -> Result<IndexStatus, IndexerError> {
        let meta = sqlx::query("SELECT last_indexed_height, updated_at FROM index_meta WHERE id = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        let count = sqlx::query("SELECT COUNT(*) AS cnt FROM txs")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(IndexStatus {
            last_indexed_height: meta
                .as_ref()
                .map(|r| r.get::<i64, _>("last_indexed_height") as u64),
            tx_count: count.get::<i64, _>("cnt") as u64,
            updated_at: meta.as_ref().map(|r| r.get::<i64, _>("updated_at")),
        })
    }
}

fn tx_from_row(row: &sqlx::sqlite::SqliteRow) -> IndexedTx {
    IndexedTx {
        tx_hash: row.get("tx_hash"),
        height: row.get::<i64, _>("height") as u64,
        tx_index: row.get::<i64, _>("tx_index") as u32,
        code: row.get::<i64, _>("code") as u32,
        gas_wanted: row.get("gas_wanted"),
        gas_used: row.get("gas_used"),
        success: row.get::<i64, _>("success") != 0,
        log: row.get("log"),
        eth_tx_hash: row.get("eth_tx_hash"),
    }
}

// ─── TxIndexStore impl ───────────────────────────────────────────────────────

#[async_trait]
impl TxIndexStore for SqliteTxIndex {
    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query("SELECT last_indexed_height FROM index_meta WHERE id = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<i64, _>("last_indexed_height") as u64))
    }

    async fn index_block(&self, block: &Block, results: &BlockResults) -> Result<(), IndexerError> {
        let txs = IndexedTx::from_block(block, results)?;
        let height = block.height() as i64;

        let mut db = self.pool.begin().await.map_err(storage_err)?;

        for tx in &txs {
            sqlx::query(
                "INSERT OR REPLACE INTO txs
                     (tx_hash, height, tx_index, code, gas_wanted, gas_used, success, log,
                      eth_tx_hash, eth_key)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(normalize_tx_hash(&tx.tx_hash))
            .bind(tx.height as i64)
            .bind(tx.tx_index as i64)
            .bind(tx.code as i64)
            .bind(tx.gas_wanted)
            .bind(tx.gas_used)
            .bind(tx.success as i64)
            .bind(&tx.log)
            .bind(&tx.eth_tx_hash)
            .bind(tx.eth_tx_hash.as_deref().map(normalize_tx_hash))
            .execute(&mut *db)
            .await
            .map_err(storage_err)?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO blocks (height, hash, time, tx_count) VALUES (?, ?, ?, ?)",
        )
        .bind(height)
        .bind(&block.header.hash)
        .bind(&block.header.time)
        .bind(txs.len() as i64)
        .execute(&mut *db)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "INSERT INTO index_meta (id, last_indexed_height, updated_at) VALUES (0, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 last_indexed_height = MAX(last_indexed_height, excluded.last_indexed_height),
                 updated_at = excluded.updated_at",
        )
        .bind(height)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *db)
        .await
        .map_err(storage_err)?;

        db.commit().await.map_err(storage_err)?;

        debug!(height, txs = txs.len(), "block stored");
        Ok(())
    }
}

#[async_trait]
impl TxLookup for SqliteTxIndex {
    async fn tx_by_hash(&self, tx_hash: &str) -> Result<Option<IndexedTx>, IndexerError> {
        let row = sqlx::query(
            "SELECT tx_hash, height, tx_index, code, gas_wanted, gas_used, success, log, eth_tx_hash
             FROM txs WHERE tx_hash = ?",
        )
        .bind(normalize_tx_hash(tx_hash))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(tx_from_row))
    }

    async fn tx_by_eth_hash(&self, eth_hash: &str) -> Result<Option<IndexedTx>, IndexerError> {
        let row = sqlx::query(
            "SELECT tx_hash, height, tx_index, code, gas_wanted, gas_used, success, log, eth_tx_hash
             FROM txs WHERE eth_key = ? LIMIT 1",
        )
        .bind(normalize_tx_hash(eth_hash))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.as_ref().map(tx_from_row))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
