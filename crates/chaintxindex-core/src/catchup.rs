//! The catch-up loop — walks every height between the cursor and the chain tip.
//!
//! # WAITING
//! Nothing new (`latest <= cursor`) or the previous pass failed to fetch a
//! block. Sleep until a [`WakeSignal`] or `wait_timeout`, whichever is first.
//!
//! # DRAINING
//! For each height in `cursor + 1 ..= latest`, in order:
//!   - fetch the block, then its results (a failure parks the loop in WAITING
//!     and the same height is retried later)
//!   - check both carry the requested height (a mismatch stops the loop)
//!   - hand both to the store (a store failure is logged and skipped)
//!   - advance the cursor

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::NodeClient;
use crate::config::IndexerState;
use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::notifier::{LatestHeight, WakeSignal};
use crate::store::TxIndexStore;

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Slept; `woken` is `false` if the timeout fired first.
    Waited { woken: bool },
    /// Walked the gap. `failed_at` is the height whose fetch failed, if any.
    Drained { indexed: u64, failed_at: Option<u64> },
}

enum Outcome {
    Indexed,
    FetchFailed,
}

/// The sequential fetch-and-index loop.
pub struct CatchUpLoop {
    client: Arc<dyn NodeClient>,
    store: Arc<dyn TxIndexStore>,
    latest: LatestHeight,
    wake: WakeSignal,
    cursor: Cursor,
    wait_timeout: Duration,
    fetch_failed: bool,
    state: Arc<watch::Sender<IndexerState>>,
}

impl CatchUpLoop {
    /// Build the loop, reading the cursor from the store.
    ///
    /// An unset cursor starts at the current latest height: history before
    /// start-up is skipped.
    pub async fn new(
        client: Arc<dyn NodeClient>,
        store: Arc<dyn TxIndexStore>,
        latest: LatestHeight,
        wake: WakeSignal,
        wait_timeout: Duration,
    ) -> Result<Self, IndexerError> {
        let stored = store.last_indexed_height().await?;
        let cursor = Cursor::resume(stored, latest.get());
        if stored.is_none() {
            info!(height = cursor.height(), "no indexed blocks yet, starting at chain tip");
        }
        let (state, _) = watch::channel(IndexerState::Waiting);
        Ok(Self {
            client,
            store,
            latest,
            wake,
            cursor,
            wait_timeout,
            fetch_failed: false,
            state: Arc::new(state),
        })
    }

    /// Publish loop state on `state` instead of a private channel.
    pub fn with_state(mut self, state: Arc<watch::Sender<IndexerState>>) -> Self {
        self.state = state;
        self
    }

    /// Last indexed height.
    pub fn cursor(&self) -> u64 {
        self.cursor.height()
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    /// Run one iteration: either wait, or drain the known gap.
    pub async fn step(&mut self) -> Result<Step, IndexerError> {
        let latest = self.latest.get();

        if !self.cursor.is_behind(latest) || self.fetch_failed {
            self.state.send_replace(IndexerState::Waiting);
            let woken = tokio::select! {
                _ = self.wake.notified() => true,
                _ = tokio::time::sleep(self.wait_timeout) => false,
            };
            self.fetch_failed = false;
            return Ok(Step::Waited { woken });
        }

        self.state.send_replace(IndexerState::Draining);
        let from = self.cursor.next_height();
        let mut indexed = 0;
        for height in from..=latest {
            match self.index_height(height).await? {
                Outcome::Indexed => indexed += 1,
                Outcome::FetchFailed => {
                    self.fetch_failed = true;
                    return Ok(Step::Drained {
                        indexed,
                        failed_at: Some(height),
                    });
                }
            }
        }

        info!(from, to = latest, "indexed blocks");
        Ok(Step::Drained {
            indexed,
            failed_at: None,
        })
    }

    /// Fetch, check and store one height.
    ///
    /// Any error from the node client is a fetch failure, whatever its
    /// variant. `Err` is reserved for errors that must stop the loop.
    async fn index_height(&mut self, height: u64) -> Result<Outcome, IndexerError> {
        let block = match self.client.block(height).await {
            Ok(block) => block,
            Err(e) => {
                warn!(height, error = %e, "failed to fetch block");
                return Ok(Outcome::FetchFailed);
            }
        };
        let results = match self.client.block_results(height).await {
            Ok(results) => results,
            Err(e) => {
                warn!(height, error = %e, "failed to fetch block results");
                return Ok(Outcome::FetchFailed);
            }
        };

        if block.height() != height || results.height != height {
            return Err(IndexerError::HeightMismatch {
                expected: height,
                block: block.height(),
                results: results.height,
            });
        }

        match self.store.index_block(&block, &results).await {
            Ok(()) => debug!(height, txs = block.txs.len(), "indexed block"),
            Err(e) => warn!(height, error = %e, "failed to index block"),
        }

        let advanced = self.cursor.advance(height);
        debug_assert!(advanced, "cursor skipped to {height}");
        Ok(Outcome::Indexed)
    }

    /// Loop until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation drops any in-flight fetch.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), IndexerError> {
        info!(
            cursor = self.cursor.height(),
            latest = self.latest.get(),
            "catch-up loop started"
        );
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                step = self.step() => Some(step),
            };
            match step {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        info!(cursor = self.cursor.height(), "catch-up loop stopped");
        Ok(())
    }
}
