//! Height notifier — tracks the chain tip from the node's header subscription.
//!
//! The notifier is the only writer of [`LatestHeight`]. Every time it sees a
//! higher header it stores the new height and posts a [`WakeSignal`]. Signals
//! carry no payload and coalesce: the catch-up loop always re-reads the
//! latest height after waking, so one pending wake-up is as good as many.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::HeaderSubscription;
use crate::error::IndexerError;

/// Highest height announced by the node. Monotonically non-decreasing.
#[derive(Debug, Clone, Default)]
pub struct LatestHeight(Arc<AtomicU64>);

impl LatestHeight {
    pub fn new(height: u64) -> Self {
        Self(Arc::new(AtomicU64::new(height)))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the height to `height`. Returns `true` if it went up.
    pub(crate) fn advance(&self, height: u64) -> bool {
        self.0.fetch_max(height, Ordering::AcqRel) < height
    }
}

/// Single-slot, payload-free wake-up.
#[derive(Debug, Clone, Default)]
pub struct WakeSignal(Arc<Notify>);

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a wake-up. Never blocks; a pending wake-up absorbs this one.
    pub fn notify(&self) {
        self.0.notify_one();
    }

    /// Wait for the next wake-up (returns immediately if one is pending).
    pub async fn notified(&self) {
        self.0.notified().await;
    }
}

/// Consumes new-block-header events and publishes the chain tip.
#[derive(Debug, Clone)]
pub struct HeightNotifier {
    latest: LatestHeight,
    wake: WakeSignal,
}

impl HeightNotifier {
    pub fn new(latest: LatestHeight, wake: WakeSignal) -> Self {
        Self { latest, wake }
    }

    /// Read handle on the latest known height.
    pub fn latest(&self) -> LatestHeight {
        self.latest.clone()
    }

    /// The signal raised whenever the latest height increases.
    pub fn wake_signal(&self) -> WakeSignal {
        self.wake.clone()
    }

    /// Record a header at `height`. Lower or equal heights are ignored.
    pub fn observe(&self, height: u64) -> bool {
        if !self.latest.advance(height) {
            return false;
        }
        self.wake.notify();
        true
    }

    /// Consume `headers` until cancelled.
    ///
    /// A subscription error or a closed stream ends the task with an error:
    /// without it the loop would wait on a stale height forever.
    pub async fn run(
        self,
        mut headers: HeaderSubscription,
        cancel: CancellationToken,
    ) -> Result<(), IndexerError> {
        info!(latest = self.latest.get(), "height notifier started");
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("height notifier cancelled");
                    return Ok(());
                }
                next = headers.recv() => next,
            };

            match next {
                Some(Ok(header)) => {
                    if self.observe(header.height) {
                        debug!(height = header.height, "new chain height");
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "block header subscription failed");
                    return Err(e);
                }
                None => {
                    warn!("block header subscription closed");
                    return Err(IndexerError::Subscription("header stream closed".into()));
                }
            }
        }
    }

    /// Run on a background task.
    pub fn spawn(
        self,
        headers: HeaderSubscription,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), IndexerError>> {
        tokio::spawn(self.run(headers, cancel))
    }
}
