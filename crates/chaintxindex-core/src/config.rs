//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::error::IndexerError;

/// Subscriber name used when registering with the node's event bus.
pub const SERVICE_NAME: &str = "EVMIndexerService";

/// Configuration for an indexer service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Subscriber name presented to the node.
    pub subscriber: String,
    /// First wait of the readiness gate (milliseconds).
    pub readiness_initial_interval_ms: u64,
    /// Cap on a single readiness wait (milliseconds).
    pub readiness_max_interval_ms: u64,
    /// Growth factor between readiness waits.
    pub readiness_multiplier: f64,
    /// Random spread applied to each readiness wait, as a fraction of it.
    pub readiness_jitter_fraction: f64,
    /// Total time the readiness gate may spend before giving up (milliseconds).
    pub readiness_max_elapsed_ms: u64,
    /// Longest the catch-up loop sleeps without a wake-up (milliseconds).
    /// Also the retry delay after a failed fetch.
    pub new_block_wait_timeout_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            subscriber: SERVICE_NAME.into(),
            readiness_initial_interval_ms: 500,
            readiness_max_interval_ms: 10_000,
            readiness_multiplier: 1.5,
            readiness_jitter_fraction: 0.5,
            readiness_max_elapsed_ms: 48 * 60 * 60 * 1_000,
            new_block_wait_timeout_ms: 60_000,
        }
    }
}

impl IndexerConfig {
    pub fn new_block_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.new_block_wait_timeout_ms)
    }

    /// Backoff settings for the readiness gate.
    pub fn readiness_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_interval: Duration::from_millis(self.readiness_initial_interval_ms),
            max_interval: Duration::from_millis(self.readiness_max_interval_ms),
            multiplier: self.readiness_multiplier,
            jitter_fraction: self.readiness_jitter_fraction,
            max_elapsed: Some(Duration::from_millis(self.readiness_max_elapsed_ms)),
        }
    }

    /// Reject settings that would make the loops spin or never start.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.readiness_initial_interval_ms == 0 {
            return Err(IndexerError::Config("readiness initial interval must be > 0".into()));
        }
        if self.readiness_max_interval_ms < self.readiness_initial_interval_ms {
            return Err(IndexerError::Config(
                "readiness max interval must be >= initial interval".into(),
            ));
        }
        if self.readiness_multiplier.is_nan() || self.readiness_multiplier < 1.0 {
            return Err(IndexerError::Config("readiness multiplier must be >= 1.0".into()));
        }
        if !(0.0..=1.0).contains(&self.readiness_jitter_fraction) {
            return Err(IndexerError::Config(
                "readiness jitter fraction must be within 0.0..=1.0".into(),
            ));
        }
        if self.readiness_max_elapsed_ms == 0 {
            return Err(IndexerError::Config("readiness max elapsed time must be > 0".into()));
        }
        if self.new_block_wait_timeout_ms == 0 {
            return Err(IndexerError::Config("new block wait timeout must be > 0".into()));
        }
        if self.subscriber.is_empty() {
            return Err(IndexerError::Config("subscriber name must not be empty".into()));
        }
        Ok(())
    }
}

/// Runtime state of the indexer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Readiness gate is polling the node.
    WaitingForNode,
    /// Caught up (or backing off after a fetch error); waiting for a new height.
    Waiting,
    /// Indexing the gap between the cursor and the latest known height.
    Draining,
    /// Shutting down gracefully.
    Stopping,
    /// Terminated.
    Stopped,
    /// Encountered an unrecoverable error.
    Error,
}

impl IndexerState {
    /// `true` once the service has passed the readiness gate and not yet stopped.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Waiting | Self::Draining)
    }
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::WaitingForNode => write!(f, "waiting-for-node"),
            Self::Waiting => write!(f, "waiting"),
            Self::Draining => write!(f, "draining"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}
