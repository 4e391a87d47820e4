//! chaintxindex-core — chain-following transaction indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerService
//!     ├── readiness gate   (poll node status until height > 0)
//!     ├── HeightNotifier   (header subscription → LatestHeight + WakeSignal)
//!     └── CatchUpLoop      (cursor+1 ..= latest, fetch → index → advance)
//!             ├── NodeClient    (status / subscribe / block / block_results)
//!             └── TxIndexStore  (last indexed height / index block)
//! ```

pub mod backoff;
pub mod builder;
pub mod catchup;
pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod notifier;
pub mod readiness;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use builder::IndexerBuilder;
pub use catchup::{CatchUpLoop, Step};
pub use client::{HeaderSubscription, NodeClient};
pub use config::{IndexerConfig, IndexerState, SERVICE_NAME};
pub use cursor::Cursor;
pub use error::IndexerError;
pub use notifier::{HeightNotifier, LatestHeight, WakeSignal};
pub use readiness::wait_until_ready;
pub use service::IndexerService;
pub use store::{TxIndexStore, TxLookup};
pub use types::{Block, BlockHeader, BlockResults, IndexedTx, NewBlockHeader, NodeStatus, Tx, TxResult};
