//! Scripted node client and recording store for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::{HeaderSubscription, NodeClient};
use crate::error::IndexerError;
use crate::store::TxIndexStore;
use crate::types::{
    Block, BlockHeader, BlockResults, NewBlockHeader, NodeStatus, Tx, TxResult,
};

type MakeError = fn(u64) -> IndexerError;
type Failures = Mutex<HashMap<u64, (u32, MakeError)>>;

/// A node that serves every block up to its current height.
pub struct MockNode {
    height: Mutex<u64>,
    status_calls: AtomicU32,
    zero_heights_left: AtomicU32,
    status_failures_left: AtomicU32,
    block_failures: Failures,
    results_failures: Failures,
    mismatched_results: Mutex<HashSet<u64>>,
    block_calls: Mutex<Vec<u64>>,
    hang_fetches: AtomicBool,
    refuse_subscribe: AtomicBool,
    headers: Mutex<Option<mpsc::UnboundedSender<Result<NewBlockHeader, IndexerError>>>>,
}

impl MockNode {
    pub fn new(height: u64) -> Self {
        Self {
            height: Mutex::new(height),
            status_calls: AtomicU32::new(0),
            zero_heights_left: AtomicU32::new(0),
            status_failures_left: AtomicU32::new(0),
            block_failures: Mutex::new(HashMap::new()),
            results_failures: Mutex::new(HashMap::new()),
            mismatched_results: Mutex::new(HashSet::new()),
            block_calls: Mutex::new(Vec::new()),
            hang_fetches: AtomicBool::new(false),
            refuse_subscribe: AtomicBool::new(false),
            headers: Mutex::new(None),
        }
    }

    /// Answer `status` with height 0 for the next `n` calls.
    pub fn report_zero_height(&self, n: u32) {
        self.zero_heights_left.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` `status` calls.
    pub fn fail_status(&self, n: u32) {
        self.status_failures_left.store(n, Ordering::SeqCst);
    }

    /// Fail the next `times` block fetches at `height` with a transport error.
    pub fn fail_block(&self, height: u64, times: u32) {
        self.fail_block_with(height, times, |h| {
            IndexerError::Rpc(format!("timeout fetching block {h}"))
        });
    }

    /// Fail the next `times` block fetches at `height` with `make(height)`.
    pub fn fail_block_with(&self, height: u64, times: u32, make: MakeError) {
        self.block_failures.lock().unwrap().insert(height, (times, make));
    }

    /// Fail the next `times` results fetches at `height` with `NotFound`.
    pub fn fail_results(&self, height: u64, times: u32) {
        self.fail_results_with(height, times, |height| IndexerError::NotFound {
            what: "block results",
            height,
        });
    }

    /// Fail the next `times` results fetches at `height` with `make(height)`.
    pub fn fail_results_with(&self, height: u64, times: u32, make: MakeError) {
        self.results_failures.lock().unwrap().insert(height, (times, make));
    }

    /// Serve results for `height` labelled with the wrong height.
    pub fn mismatch_results(&self, height: u64) {
        self.mismatched_results.lock().unwrap().insert(height);
    }

    /// Make block fetches never complete.
    pub fn hang_fetches(&self) {
        self.hang_fetches.store(true, Ordering::SeqCst);
    }

    pub fn refuse_subscribe(&self) {
        self.refuse_subscribe.store(true, Ordering::SeqCst);
    }

    /// Produce a new block and push its header to the subscriber.
    pub fn announce(&self, height: u64) {
        {
            let mut h = self.height.lock().unwrap();
            *h = (*h).max(height);
        }
        if let Some(tx) = self.headers.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(NewBlockHeader { height }));
        }
    }

    /// Push a subscription error to the subscriber.
    pub fn break_subscription(&self, reason: &str) {
        if let Some(tx) = self.headers.lock().unwrap().take() {
            let _ = tx.send(Err(IndexerError::Subscription(reason.into())));
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.headers.lock().unwrap().is_some()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Heights passed to `block`, in call order.
    pub fn block_calls(&self) -> Vec<u64> {
        self.block_calls.lock().unwrap().clone()
    }

    fn take_failure(failures: &Failures, height: u64) -> Option<IndexerError> {
        let mut failures = failures.lock().unwrap();
        match failures.get_mut(&height) {
            Some((n, make)) if *n > 0 => {
                *n -= 1;
                Some((*make)(height))
            }
            _ => None,
        }
    }

    fn check_available(&self, what: &'static str, height: u64) -> Result<(), IndexerError> {
        if height > *self.height.lock().unwrap() {
            return Err(IndexerError::NotFound { what, height });
        }
        Ok(())
    }
}

pub fn mock_block(height: u64) -> Block {
    Block {
        header: BlockHeader {
            height,
            hash: format!("BLOCK{height}"),
            chain_id: "test_1-1".into(),
            time: "2024-01-01T00:00:00Z".into(),
        },
        txs: vec![Tx {
            hash: format!("TX{height}"),
            bytes: height.to_be_bytes().to_vec(),
        }],
    }
}

pub fn mock_results(height: u64) -> BlockResults {
    BlockResults {
        height,
        tx_results: vec![TxResult {
            gas_used: 21_000,
            ..Default::default()
        }],
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl NodeClient for MockNode {
    async fn status(&self) -> Result<NodeStatus, IndexerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.status_failures_left) {
            return Err(IndexerError::Rpc("connection refused".into()));
        }
        if take(&self.zero_heights_left) {
            return Ok(NodeStatus {
                latest_block_height: 0,
            });
        }
        Ok(NodeStatus {
            latest_block_height: *self.height.lock().unwrap(),
        })
    }

    async fn subscribe_new_block_headers(
        &self,
        _subscriber: &str,
    ) -> Result<HeaderSubscription, IndexerError> {
        if self.refuse_subscribe.load(Ordering::SeqCst) {
            return Err(IndexerError::Subscription("subscription refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.headers.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn block(&self, height: u64) -> Result<Block, IndexerError> {
        self.block_calls.lock().unwrap().push(height);
        if self.hang_fetches.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(e) = Self::take_failure(&self.block_failures, height) {
            return Err(e);
        }
        self.check_available("block", height)?;
        Ok(mock_block(height))
    }

    async fn block_results(&self, height: u64) -> Result<BlockResults, IndexerError> {
        if let Some(e) = Self::take_failure(&self.results_failures, height) {
            return Err(e);
        }
        self.check_available("block results", height)?;
        if self.mismatched_results.lock().unwrap().contains(&height) {
            return Ok(mock_results(height + 1));
        }
        Ok(mock_results(height))
    }
}

/// A store that records every `index_block` call.
#[derive(Default)]
pub struct RecordingStore {
    cursor: Mutex<Option<u64>>,
    indexed: Mutex<Vec<u64>>,
    failing: Mutex<HashSet<u64>>,
}

impl RecordingStore {
    pub fn new(cursor: Option<u64>) -> Self {
        Self {
            cursor: Mutex::new(cursor),
            ..Default::default()
        }
    }

    /// Make `index_block` fail at `height`.
    pub fn fail_at(&self, height: u64) {
        self.failing.lock().unwrap().insert(height);
    }

    /// Heights passed to `index_block`, in call order (failed calls included).
    pub fn indexed(&self) -> Vec<u64> {
        self.indexed.lock().unwrap().clone()
    }

    pub fn cursor(&self) -> Option<u64> {
        *self.cursor.lock().unwrap()
    }
}

#[async_trait]
impl TxIndexStore for RecordingStore {
    async fn last_indexed_height(&self) -> Result<Option<u64>, IndexerError> {
        Ok(*self.cursor.lock().unwrap())
    }

    async fn index_block(&self, block: &Block, _results: &BlockResults) -> Result<(), IndexerError> {
        let height = block.height();
        self.indexed.lock().unwrap().push(height);
        if self.failing.lock().unwrap().contains(&height) {
            return Err(IndexerError::Storage(format!("write failed at {height}")));
        }
        *self.cursor.lock().unwrap() = Some(height);
        Ok(())
    }
}
