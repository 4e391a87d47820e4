//! Indexer cursor — the highest height fully indexed so far.

/// The catch-up loop's position in the chain.
///
/// Only ever moves forward, one height at a time. The persisted copy lives in
/// the store; this is the in-memory view owned by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    height: u64,
}

impl Cursor {
    /// Create a cursor positioned at `height` (already indexed).
    pub fn new(height: u64) -> Self {
        Self { height }
    }

    /// Resolve the start position from the store's cursor.
    ///
    /// `None` means nothing was ever indexed: start at the current tip and
    /// skip history.
    pub fn resume(stored: Option<u64>, tip: u64) -> Self {
        Self::new(stored.unwrap_or(tip))
    }

    /// Last indexed height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Returns the next height to index (cursor + 1).
    pub fn next_height(&self) -> u64 {
        self.height + 1
    }

    /// Advance to `height`. Only the immediate successor is accepted.
    pub fn advance(&mut self, height: u64) -> bool {
        if height != self.next_height() {
            return false;
        }
        self.height = height;
        true
    }

    /// Returns `true` if `latest` is ahead of the cursor.
    pub fn is_behind(&self, latest: u64) -> bool {
        latest > self.height
    }
}
