//! # MVCC Store
//!
//! Per-key version chains keyed by HLC timestamps. Writers prepend a new
//! version; readers walk from the newest version down to the first one at
//! or below their read timestamp. Deletes are tombstone versions, so a
//! snapshot taken before the delete still sees the old data.
//!
//! ```text
//! "balance" ──> [ts=8 "900"] ──> [ts=5 "1000"] ──> [ts=2 tombstone]
//!                 newest                              oldest
//! ```
//!
//! ## Locking
//!
//! Two levels: a store-wide RW-lock over the key map and a per-key
//! RW-lock over each chain. Readers take both shared, so readers never
//! block readers; writers on different keys only contend on the map lock
//! long enough to clone the chain handle.
//!
//! Old versions are never garbage collected here.

use crate::distributed::{Hlc, Timestamp};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Version {
    ts: Timestamp,
    /// `None` marks a tombstone.
    data: Option<Vec<u8>>,
}

/// Newest-first version list for one key.
#[derive(Debug, Default)]
struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    fn prepend(&mut self, version: Version) {
        self.versions.insert(0, version);
    }

    /// Newest version visible at `read_ts`.
    fn visible_at(&self, read_ts: Timestamp) -> Option<&Version> {
        self.versions.iter().find(|v| v.ts <= read_ts)
    }
}

pub struct MvccStore {
    clock: Arc<Hlc>,
    data: RwLock<HashMap<String, Arc<RwLock<VersionChain>>>>,
}

impl MvccStore {
    pub fn new(clock: Arc<Hlc>) -> Self {
        Self {
            clock,
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<Hlc> {
        &self.clock
    }

    fn chain(&self, key: &str) -> Arc<RwLock<VersionChain>> {
        if let Some(chain) = self.data.read().get(key) {
            return Arc::clone(chain);
        }
        let mut map = self.data.write();
        Arc::clone(
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(VersionChain::default()))),
        )
    }

    /// Writes a new version of `key` and returns its timestamp.
    pub fn put(&self, key: &str, data: Vec<u8>) -> Timestamp {
        let ts = self.clock.now();
        let chain = self.chain(key);
        chain.write().prepend(Version {
            ts,
            data: Some(data),
        });
        ts
    }

    /// Snapshot read: the newest version with `ts <= read_ts`. Returns
    /// `None` when that version is a tombstone or when `read_ts` predates
    /// every write to the key.
    pub fn get(&self, key: &str, read_ts: Timestamp) -> Option<Vec<u8>> {
        let chain = {
            let map = self.data.read();
            Arc::clone(map.get(key)?)
        };
        let guard = chain.read();
        guard.visible_at(read_ts).and_then(|v| v.data.clone())
    }

    /// Read at the current clock time — the newest committed state.
    pub fn get_latest(&self, key: &str) -> Option<Vec<u8>> {
        self.get(key, self.clock.now())
    }

    /// Writes a tombstone version and returns its timestamp.
    pub fn delete(&self, key: &str) -> Timestamp {
        let ts = self.clock.now();
        let chain = self.chain(key);
        chain.write().prepend(Version { ts, data: None });
        ts
    }

    /// Number of versions kept for `key`, tombstones included.
    pub fn version_count(&self, key: &str) -> usize {
        self.data
            .read()
            .get(key)
            .map(|chain| chain.read().versions.len())
            .unwrap_or(0)
    }
}
