//! Fluent builder API for creating indexer services.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use chaintxindex_core::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .readiness_max_interval(Duration::from_secs(10))
//!     .readiness_max_elapsed(Duration::from_secs(48 * 3600))
//!     .new_block_wait_timeout(Duration::from_secs(60))
//!     .build_config();
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::client::NodeClient;
use crate::config::IndexerConfig;
use crate::error::IndexerError;
use crate::service::IndexerService;
use crate::store::TxIndexStore;

/// Fluent builder for `IndexerConfig` and `IndexerService`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the subscriber name presented to the node.
    pub fn subscriber(mut self, name: impl Into<String>) -> Self {
        self.config.subscriber = name.into();
        self
    }

    /// Set the first readiness retry delay.
    pub fn readiness_initial_interval(mut self, d: Duration) -> Self {
        self.config.readiness_initial_interval_ms = d.as_millis() as u64;
        self
    }

    /// Cap a single readiness retry delay.
    pub fn readiness_max_interval(mut self, d: Duration) -> Self {
        self.config.readiness_max_interval_ms = d.as_millis() as u64;
        self
    }

    /// Set the readiness backoff growth factor.
    pub fn readiness_multiplier(mut self, m: f64) -> Self {
        self.config.readiness_multiplier = m;
        self
    }

    /// Randomize readiness waits by ±`f` of each delay (0.0 disables jitter).
    pub fn readiness_jitter(mut self, f: f64) -> Self {
        self.config.readiness_jitter_fraction = f;
        self
    }

    /// Give up waiting for the node after this long.
    pub fn readiness_max_elapsed(mut self, d: Duration) -> Self {
        self.config.readiness_max_elapsed_ms = d.as_millis() as u64;
        self
    }

    /// Longest idle wait between checks for new blocks.
    pub fn new_block_wait_timeout(mut self, d: Duration) -> Self {
        self.config.new_block_wait_timeout_ms = d.as_millis() as u64;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and build a service.
    pub fn build(
        self,
        client: Arc<dyn NodeClient>,
        store: Arc<dyn TxIndexStore>,
    ) -> Result<IndexerService, IndexerError> {
        self.config.validate()?;
        Ok(IndexerService::new(client, store, self.config))
    }
}
