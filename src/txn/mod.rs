//! # Transactions
//!
//! Transaction handles and their manager. A [`Transaction`] is a one-shot
//! state machine:
//!
//! ```text
//! begin() ───> Active ───> commit()   ───> Committed
//!                │
//!                └──────> rollback()  ───> RolledBack
//! ```
//!
//! The manager allocates monotonic ids starting at 1, writes the Begin
//! marker to the WAL, and keeps a weak reference per active transaction —
//! commit or rollback transitions the state, flushes the WAL (durability
//! point) and drops the manager's reference.
//!
//! Runtime rollback writes the Rollback marker only; it does not rewind
//! heap pages. The recovery manager owns the undo path (see
//! [`recovery`]).

pub mod recovery;

pub use recovery::{RecoveryManager, RecoverySummary};

use crate::wal::Wal;
use eyre::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnState {
    #[default]
    Active,
    Committed,
    RolledBack,
}

/// Typed transaction errors, matchable via `downcast_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnError {
    /// Commit or rollback on a transaction that is no longer Active.
    NotActive(u64),
    /// A 2PC participant voted No and the transaction was aborted.
    Aborted(u64),
}

impl fmt::Display for TxnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnError::NotActive(id) => write!(f, "transaction {} is not active", id),
            TxnError::Aborted(id) => write!(f, "transaction {} aborted", id),
        }
    }
}

impl std::error::Error for TxnError {}

pub struct Transaction {
    id: u64,
    state: Mutex<TxnState>,
    start_lsn: u64,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TxnState {
        *self.state.lock()
    }

    /// LSN of this transaction's Begin record.
    pub fn start_lsn(&self) -> u64 {
        self.start_lsn
    }
}

pub struct TxnManager {
    wal: Arc<Wal>,
    next_txn_id: AtomicU64,
    active: Mutex<HashMap<u64, Weak<Transaction>>>,
}

impl TxnManager {
    pub fn new(wal: Arc<Wal>) -> Self {
        Self {
            wal,
            next_txn_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    /// Allocates a fresh id, logs the Begin marker and hands back an
    /// Active transaction.
    pub fn begin(&self) -> Arc<Transaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let start_lsn = self.wal.log_begin(id);
        let txn = Arc::new(Transaction {
            id,
            state: Mutex::new(TxnState::Active),
            start_lsn,
        });
        self.active.lock().insert(id, Arc::downgrade(&txn));
        txn
    }

    /// Transitions to Committed, logs the Commit marker and flushes. The
    /// transaction is durable once this returns.
    pub fn commit(&self, txn: &Transaction) -> Result<()> {
        {
            let mut state = txn.state.lock();
            if *state != TxnState::Active {
                return Err(TxnError::NotActive(txn.id).into());
            }
            *state = TxnState::Committed;
        }
        self.wal.log_commit(txn.id);
        self.wal.flush()?;
        self.active.lock().remove(&txn.id);
        Ok(())
    }

    /// Transitions to RolledBack and logs the Rollback marker. Heap pages
    /// are not rewound here; recovery-time undo is authoritative.
    pub fn rollback(&self, txn: &Transaction) -> Result<()> {
        {
            let mut state = txn.state.lock();
            if *state != TxnState::Active {
                return Err(TxnError::NotActive(txn.id).into());
            }
            *state = TxnState::RolledBack;
        }
        self.wal.log_rollback(txn.id);
        self.wal.flush()?;
        self.active.lock().remove(&txn.id);
        Ok(())
    }

    pub fn is_active(&self, txn_id: u64) -> bool {
        self.active
            .lock()
            .get(&txn_id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
