//! # Two-Phase Commit
//!
//! A coordinator drives a set of [`Participant`]s through prepare and
//! decide:
//!
//! ```text
//! commit(txn, writes)
//!   │  prepare(txn, writes, ts) ──> vote per participant
//!   │        (short-circuits on the first No)
//!   ├─ all Yes ─> commit(txn, ts) to every participant ─> Committed
//!   └─ any  No ─> abort(txn)      to every participant ─> Aborted
//! ```
//!
//! Participants are in-process and assumed reliable; a participant that
//! fails between a Yes vote and the commit call leaves the coordinator's
//! record Committed while the participant forgot the writes — resolving
//! that needs a coordinator log and retry, which this engine does not
//! carry.
//!
//! `Participant` stays a trait (the one real plug-point here); everything
//! else is concrete.

use crate::distributed::{Hlc, MvccStore, Timestamp};
use crate::txn::TxnError;
use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One key-value write a transaction intends to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteIntent {
    pub key: String,
    pub value: Vec<u8>,
}

impl WriteIntent {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Most transactions touch a handful of keys; keep their write sets off
/// the heap.
pub type WriteSet = SmallVec<[WriteIntent; 8]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareVote {
    pub yes: bool,
    pub reason: Option<String>,
}

impl PrepareVote {
    pub fn yes() -> Self {
        Self {
            yes: true,
            reason: None,
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            yes: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoPhaseState {
    Pending,
    Committed,
    Aborted,
}

/// A 2PC participant. Prepare must be idempotent; commit applies the
/// prepared writes and forgets them; abort forgets without applying.
pub trait Participant: Send + Sync {
    fn node_id(&self) -> &str;
    fn prepare(&self, txn_id: u64, writes: &[WriteIntent], ts: Timestamp) -> PrepareVote;
    fn commit(&self, txn_id: u64, ts: Timestamp);
    fn abort(&self, txn_id: u64);
}

struct TxnRecord {
    state: TwoPhaseState,
    start_ts: Timestamp,
    participants: Vec<String>,
}

pub struct Coordinator {
    clock: Arc<Hlc>,
    participants: Vec<Arc<dyn Participant>>,
    next_txn_id: AtomicU64,
    transactions: Mutex<HashMap<u64, TxnRecord>>,
}

impl Coordinator {
    pub fn new(participants: Vec<Arc<dyn Participant>>, clock: Arc<Hlc>) -> Self {
        Self {
            clock,
            participants,
            next_txn_id: AtomicU64::new(1),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a transaction id and records it as Pending.
    pub fn begin(&self) -> u64 {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let participants = self
            .participants
            .iter()
            .map(|p| p.node_id().to_string())
            .collect();
        self.transactions.lock().insert(
            txn_id,
            TxnRecord {
                state: TwoPhaseState::Pending,
                start_ts: self.clock.now(),
                participants,
            },
        );
        txn_id
    }

    /// Runs both phases. Any No vote aborts every participant and fails
    /// with [`TxnError::Aborted`].
    pub fn commit(&self, txn_id: u64, writes: &[WriteIntent]) -> Result<Timestamp> {
        let ts = self.clock.now();

        let mut all_yes = true;
        for participant in &self.participants {
            let vote = participant.prepare(txn_id, writes, ts);
            if !vote.yes {
                all_yes = false;
                break;
            }
        }

        if !all_yes {
            for participant in &self.participants {
                participant.abort(txn_id);
            }
            self.set_state(txn_id, TwoPhaseState::Aborted);
            return Err(TxnError::Aborted(txn_id).into());
        }

        for participant in &self.participants {
            participant.commit(txn_id, ts);
        }
        self.set_state(txn_id, TwoPhaseState::Committed);
        Ok(ts)
    }

    fn set_state(&self, txn_id: u64, state: TwoPhaseState) {
        if let Some(record) = self.transactions.lock().get_mut(&txn_id) {
            record.state = state;
        }
    }

    pub fn state(&self, txn_id: u64) -> Option<TwoPhaseState> {
        self.transactions.lock().get(&txn_id).map(|r| r.state)
    }

    pub fn start_ts(&self, txn_id: u64) -> Option<Timestamp> {
        self.transactions.lock().get(&txn_id).map(|r| r.start_ts)
    }

    pub fn participant_ids(&self, txn_id: u64) -> Vec<String> {
        self.transactions
            .lock()
            .get(&txn_id)
            .map(|r| r.participants.clone())
            .unwrap_or_default()
    }
}

struct PreparedTxn {
    writes: WriteSet,
    #[allow(dead_code)]
    ts: Timestamp,
}

/// Participant backed by a local [`MvccStore`]. Prepared writes are
/// staged in memory and only reach the store on commit.
pub struct LocalParticipant {
    node_id: String,
    store: Arc<MvccStore>,
    prepared: Mutex<HashMap<u64, PreparedTxn>>,
}

impl LocalParticipant {
    pub fn new(node_id: impl Into<String>, store: Arc<MvccStore>) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            prepared: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<MvccStore> {
        &self.store
    }

    pub fn prepared_count(&self) -> usize {
        self.prepared.lock().len()
    }
}

impl Participant for LocalParticipant {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn prepare(&self, txn_id: u64, writes: &[WriteIntent], ts: Timestamp) -> PrepareVote {
        let mut prepared = self.prepared.lock();
        prepared.insert(
            txn_id,
            PreparedTxn {
                writes: writes.iter().cloned().collect(),
                ts,
            },
        );
        PrepareVote::yes()
    }

    fn commit(&self, txn_id: u64, _ts: Timestamp) {
        let staged = self.prepared.lock().remove(&txn_id);
        if let Some(staged) = staged {
            for write in staged.writes {
                self.store.put(&write.key, write.value);
            }
        }
    }

    fn abort(&self, txn_id: u64) {
        self.prepared.lock().remove(&txn_id);
    }
}
