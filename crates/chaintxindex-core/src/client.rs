//! The `NodeClient` trait — what the indexer needs from a chain node.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::IndexerError;
use crate::types::{Block, BlockResults, NewBlockHeader, NodeStatus};

/// Stream of new-block-header events.
///
/// Unbounded so a slow consumer never causes a header to be dropped. An
/// `Err` item (or the channel closing) ends the subscription.
pub type HeaderSubscription = mpsc::UnboundedReceiver<Result<NewBlockHeader, IndexerError>>;

/// Async access to a chain node.
///
/// Implementations must be `Send + Sync` so one client can be shared by the
/// readiness gate, the height notifier and the catch-up loop. Dropping a
/// returned future cancels the request.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Current node status.
    async fn status(&self) -> Result<NodeStatus, IndexerError>;

    /// Open a non-lossy subscription to new block headers.
    async fn subscribe_new_block_headers(
        &self,
        subscriber: &str,
    ) -> Result<HeaderSubscription, IndexerError>;

    /// Fetch the block at `height`.
    ///
    /// Returns [`IndexerError::NotFound`] if the node does not have it yet.
    async fn block(&self, height: u64) -> Result<Block, IndexerError>;

    /// Fetch the execution results of the block at `height`.
    async fn block_results(&self, height: u64) -> Result<BlockResults, IndexerError>;
}
