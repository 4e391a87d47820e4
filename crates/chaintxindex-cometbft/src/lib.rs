//! chaintxindex-cometbft — CometBFT node client for ChainTxIndex.
//!
//! - [`CometClient`] implements [`NodeClient`](chaintxindex_core::NodeClient)
//! - `status`, `block`, `block_results` go over HTTP JSON-RPC
//! - new block headers arrive over the node's `/websocket` endpoint
//!
//! # Usage
//! ```rust,no_run
//! use chaintxindex_cometbft::{CometClient, CometClientConfig};
//!
//! let client = CometClient::new(CometClientConfig::new("http://localhost:26657"))?;
//! assert_eq!(client.ws_url(), "ws://localhost:26657/websocket");
//! # Ok::<(), chaintxindex_core::IndexerError>(())
//! ```

pub mod client;
pub mod http;
pub mod jsonrpc;
pub mod wire;
pub mod ws;

pub use client::{derive_ws_url, CometClient, CometClientConfig};
pub use wire::tx_hash;
pub use ws::NEW_BLOCK_HEADER_QUERY;
