//! Indexer service — start/stop lifecycle around the gate, notifier and loop.
//!
//! `run()` blocks start-up on the readiness gate, subscribes to new block
//! headers, spawns the height notifier and then drives the catch-up loop on
//! the calling task. It returns `Ok(())` after [`IndexerService::shutdown`]
//! and an error if the node never became ready or the notifier died.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::catchup::CatchUpLoop;
use crate::client::NodeClient;
use crate::config::{IndexerConfig, IndexerState};
use crate::error::IndexerError;
use crate::notifier::{HeightNotifier, LatestHeight, WakeSignal};
use crate::readiness::wait_until_ready;
use crate::store::TxIndexStore;

/// A chain-following transaction indexer.
pub struct IndexerService {
    client: Arc<dyn NodeClient>,
    store: Arc<dyn TxIndexStore>,
    config: IndexerConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<IndexerState>>,
}

impl IndexerService {
    pub fn new(
        client: Arc<dyn NodeClient>,
        store: Arc<dyn TxIndexStore>,
        config: IndexerConfig,
    ) -> Self {
        let (state, _) = watch::channel(IndexerState::Idle);
        Self {
            client,
            store,
            config,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    /// Watch state transitions (health checks, tests).
    pub fn subscribe_state(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    /// `true` while the service is past the readiness gate and following the chain.
    pub fn is_running(&self) -> bool {
        self.state().is_live()
    }

    /// Token that stops the service when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a graceful stop. `run()` returns once in-flight work is dropped.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("indexer shutdown requested");
            self.state.send_replace(IndexerState::Stopping);
            self.cancel.cancel();
        }
    }

    /// Run until shutdown or a fatal error.
    pub async fn run(&self) -> Result<(), IndexerError> {
        let result = self.run_inner().await;
        match &result {
            Ok(()) => {
                self.state.send_replace(IndexerState::Stopped);
                info!("indexer stopped");
            }
            Err(e) => {
                self.state.send_replace(IndexerState::Error);
                error!(error = %e, "indexer failed");
            }
        }
        result
    }

    async fn run_inner(&self) -> Result<(), IndexerError> {
        self.config.validate()?;

        self.state.send_replace(IndexerState::WaitingForNode);
        let tip = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            ready = wait_until_ready(self.client.as_ref(), self.config.readiness_backoff()) => ready?,
        };

        let headers = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            sub = self.client.subscribe_new_block_headers(&self.config.subscriber) => sub?,
        };
        info!(tip, subscriber = %self.config.subscriber, "subscribed to new block headers");

        let latest = LatestHeight::new(tip);
        let wake = WakeSignal::new();
        let notifier_cancel = self.cancel.child_token();
        let mut notifier = HeightNotifier::new(latest.clone(), wake.clone())
            .spawn(headers, notifier_cancel.clone());

        let catch_up = match CatchUpLoop::new(
            self.client.clone(),
            self.store.clone(),
            latest,
            wake,
            self.config.new_block_wait_timeout(),
        )
        .await
        {
            Ok(catch_up) => catch_up.with_state(self.state.clone()),
            Err(e) => {
                notifier_cancel.cancel();
                return Err(e);
            }
        };

        let result = tokio::select! {
            run = catch_up.run(self.cancel.clone()) => run,
            joined = &mut notifier => match joined {
                Ok(Ok(())) if self.cancel.is_cancelled() => Ok(()),
                Ok(Ok(())) => Err(IndexerError::NotifierStopped {
                    reason: "exited without error".into(),
                }),
                Ok(Err(e)) => Err(e),
                Err(join) => Err(IndexerError::NotifierStopped {
                    reason: join.to_string(),
                }),
            },
        };

        notifier_cancel.cancel();
        if !notifier.is_finished() {
            let _ = notifier.await;
        }
        result
    }
}
