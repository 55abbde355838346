//! # Range Sharding
//!
//! The key space is partitioned into half-open ranges `[start, end)`,
//! each owned by one node. An empty `start_key` means −∞ and an empty
//! `end_key` means +∞, so a single range `["", "")` covers everything.
//!
//! ```text
//! ["", "g") → node1   ["g", "p") → node2   ["p", "") → node1
//! ```
//!
//! The [`RangeManager`] owns the sorted, gap-free, non-overlapping range
//! list behind a RW-lock. The [`Router`] answers "which node owns this
//! key" and the [`Rebalancer`] proposes deterministic range moves until
//! node counts differ by at most one.

mod rebalancer;
mod router;

pub use rebalancer::{RebalanceSuggestion, Rebalancer};
pub use router::Router;

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub type RangeId = u64;

/// Typed sharding errors, matchable via `downcast_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardError {
    RangeNotFound(RangeId),
    InvalidSplitKey,
    NotAdjacent(RangeId, RangeId),
}

impl fmt::Display for ShardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardError::RangeNotFound(id) => write!(f, "range {} not found", id),
            ShardError::InvalidSplitKey => f.write_str("split key outside the range"),
            ShardError::NotAdjacent(left, right) => {
                write!(f, "ranges {} and {} are not adjacent", left, right)
            }
        }
    }
}

impl std::error::Error for ShardError {}

/// One shard: a half-open key interval assigned to a node. Empty keys
/// stand for the infinities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub id: RangeId,
    pub start_key: String,
    pub end_key: String,
    pub node_id: String,
}

impl Range {
    /// Membership under the empty-as-infinity convention: `start <= key`
    /// and (`end` empty or `key < end`).
    pub fn contains(&self, key: &str) -> bool {
        if key < self.start_key.as_str() {
            return false;
        }
        self.end_key.is_empty() || key < self.end_key.as_str()
    }

    /// Interval overlap with the query `[start, end)`, empty-as-infinity
    /// on both sides.
    pub fn overlaps(&self, start: &str, end: &str) -> bool {
        if !end.is_empty() && self.start_key.as_str() >= end {
            return false;
        }
        if !self.end_key.is_empty() && start >= self.end_key.as_str() {
            return false;
        }
        true
    }
}

pub struct RangeManager {
    ranges: RwLock<Vec<Range>>,
    next_range_id: AtomicU64,
}

impl RangeManager {
    /// One range covering the whole key space, owned by `initial_node`.
    pub fn new(initial_node: impl Into<String>) -> Self {
        Self {
            ranges: RwLock::new(vec![Range {
                id: 1,
                start_key: String::new(),
                end_key: String::new(),
                node_id: initial_node.into(),
            }]),
            next_range_id: AtomicU64::new(2),
        }
    }

    fn mint_id(&self) -> RangeId {
        self.next_range_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Snapshot of the range list, sorted by `start_key`.
    pub fn ranges(&self) -> Vec<Range> {
        self.ranges.read().clone()
    }

    /// Owning range for `key`: binary search on `start_key`, verified
    /// with `contains`.
    pub fn find_range(&self, key: &str) -> Option<Range> {
        let ranges = self.ranges.read();
        let mut lo = 0usize;
        let mut hi = ranges.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let range = &ranges[mid];
            if range.contains(key) {
                return Some(range.clone());
            }
            if key < range.start_key.as_str() {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        None
    }

    pub fn range_by_id(&self, id: RangeId) -> Option<Range> {
        self.ranges.read().iter().find(|r| r.id == id).cloned()
    }

    /// Splits `id` at `split_key`. The left half keeps the id and node;
    /// the right half gets a fresh id and `new_node`.
    pub fn split(
        &self,
        id: RangeId,
        split_key: &str,
        new_node: impl Into<String>,
    ) -> Result<(Range, Range), ShardError> {
        let new_id = self.mint_id();
        let mut ranges = self.ranges.write();
        let index = ranges
            .iter()
            .position(|r| r.id == id)
            .ok_or(ShardError::RangeNotFound(id))?;

        let original = &ranges[index];
        if split_key <= original.start_key.as_str() {
            return Err(ShardError::InvalidSplitKey);
        }
        if !original.end_key.is_empty() && split_key >= original.end_key.as_str() {
            return Err(ShardError::InvalidSplitKey);
        }

        let left = Range {
            id: original.id,
            start_key: original.start_key.clone(),
            end_key: split_key.to_string(),
            node_id: original.node_id.clone(),
        };
        let right = Range {
            id: new_id,
            start_key: split_key.to_string(),
            end_key: original.end_key.clone(),
            node_id: new_node.into(),
        };

        ranges.splice(index..=index, [left.clone(), right.clone()]);
        Ok((left, right))
    }

    /// Merges two adjacent ranges; `right_id` must immediately follow
    /// `left_id` in the sorted list. The result keeps the left id and
    /// node.
    pub fn merge(&self, left_id: RangeId, right_id: RangeId) -> Result<Range, ShardError> {
        let mut ranges = self.ranges.write();
        let left_index = ranges
            .iter()
            .position(|r| r.id == left_id)
            .ok_or(ShardError::RangeNotFound(left_id))?;
        let right_index = ranges
            .iter()
            .position(|r| r.id == right_id)
            .ok_or(ShardError::RangeNotFound(right_id))?;

        if left_index + 1 != right_index {
            return Err(ShardError::NotAdjacent(left_id, right_id));
        }

        let merged = Range {
            id: ranges[left_index].id,
            start_key: ranges[left_index].start_key.clone(),
            end_key: ranges[right_index].end_key.clone(),
            node_id: ranges[left_index].node_id.clone(),
        };
        ranges.splice(left_index..=right_index, [merged.clone()]);
        Ok(merged)
    }

    /// Reassigns a range to another node.
    pub fn update_node(&self, id: RangeId, new_node: impl Into<String>) -> Result<(), ShardError> {
        let mut ranges = self.ranges.write();
        let range = ranges
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ShardError::RangeNotFound(id))?;
        range.node_id = new_node.into();
        Ok(())
    }
}
