//! Readiness gate — hold start-up until the node reports a usable height.
//!
//! A node that is still state-syncing answers `status` with a latest height of
//! zero. Seeding the catch-up range from that value would be wrong, so the
//! gate keeps polling with exponential backoff until the height is positive or
//! the elapsed-time budget runs out.

use tracing::{debug, info};

use crate::backoff::{BackoffConfig, ExponentialBackoff};
use crate::client::NodeClient;
use crate::error::IndexerError;

/// Poll `client.status()` until it reports a height above zero.
///
/// Returns that height. Fails with [`IndexerError::ReadinessTimeout`] carrying
/// the last observed failure once the backoff gives up.
pub async fn wait_until_ready<C>(client: &C, backoff: BackoffConfig) -> Result<u64, IndexerError>
where
    C: NodeClient + ?Sized,
{
    let mut backoff = ExponentialBackoff::new(backoff);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let failure = match client.status().await {
            Ok(status) if status.latest_block_height > 0 => {
                info!(
                    height = status.latest_block_height,
                    attempt,
                    "node is ready"
                );
                return Ok(status.latest_block_height);
            }
            Ok(status) => IndexerError::NodeNotReady {
                height: status.latest_block_height,
            },
            Err(e) => e,
        };

        match backoff.next_backoff() {
            Some(delay) => {
                debug!(
                    attempt,
                    error = %failure,
                    delay_ms = delay.as_millis() as u64,
                    "node not ready, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(IndexerError::ReadinessTimeout {
                    elapsed_ms: backoff.elapsed().as_millis() as u64,
                    last_error: failure.to_string(),
                });
            }
        }
    }
}
