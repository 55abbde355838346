//! # Recovery Manager
//!
//! ARIES-style recovery over the record WAL, run once at startup before
//! the database serves requests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Analyze: whole-log scan, group records per transaction, │
//! │          fold the final state (Commit/Rollback marker)  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Redo:    committed transactions, records in LSN order,  │
//! │          re-apply Insert/Update/Delete to the heap      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Undo:    crashed (still Active) transactions, records   │
//! │          in reverse LSN order, apply the inverse change │
//! │          + log a Compensate record, then Rollback       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Redo is idempotent: an insert whose row id is already present is
//! skipped, an update falls back to insert when the row is missing, and
//! a delete of a missing row is a no-op. Records for tables the catalog
//! does not know are skipped with a warning — the in-memory catalog may
//! legitimately be narrower than the log.
//!
//! Undo applies inverse operations to the heap (this is the authoritative
//! rollback path; runtime rollback only writes the marker) and leaves a
//! Compensate record per undone change so a second crash replays to the
//! same state.

use crate::records::decode_row;
use crate::schema::Catalog;
use crate::txn::TxnState;
use crate::wal::{LogKind, LogRecord, Wal};
use eyre::{Result, WrapErr};
use std::collections::BTreeMap;
use std::sync::Arc;

struct TxnStatus {
    state: TxnState,
    records: Vec<LogRecord>,
}

/// What a recovery pass did, for startup reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub redo_applied: usize,
    pub undo_applied: usize,
    pub rolled_back_txns: usize,
}

pub struct RecoveryManager {
    wal: Arc<Wal>,
    catalog: Arc<Catalog>,
}

impl RecoveryManager {
    pub fn new(wal: Arc<Wal>, catalog: Arc<Catalog>) -> Self {
        Self { wal, catalog }
    }

    /// Runs analyze → redo → undo. Errors here are fatal to startup.
    pub fn recover(&self) -> Result<RecoverySummary> {
        let records = self.wal.read().wrap_err("failed to read WAL for recovery")?;
        if records.is_empty() {
            return Ok(RecoverySummary::default());
        }

        let txn_map = Self::analyze(records);
        let mut summary = RecoverySummary::default();

        self.redo(&txn_map, &mut summary)?;
        self.undo(&txn_map, &mut summary)?;

        self.wal
            .flush()
            .wrap_err("failed to flush WAL after recovery undo")?;
        Ok(summary)
    }

    /// Groups records per transaction and folds the final state. The
    /// BTreeMap keys keep redo/undo ordering deterministic across runs.
    fn analyze(records: Vec<LogRecord>) -> BTreeMap<u64, TxnStatus> {
        let mut txn_map: BTreeMap<u64, TxnStatus> = BTreeMap::new();
        for record in records {
            let status = txn_map.entry(record.txn_id).or_insert_with(|| TxnStatus {
                state: TxnState::Active,
                records: Vec::new(),
            });
            match record.kind {
                LogKind::Commit => status.state = TxnState::Committed,
                LogKind::Rollback => status.state = TxnState::RolledBack,
                _ => {}
            }
            status.records.push(record);
        }
        txn_map
    }

    fn redo(&self, txn_map: &BTreeMap<u64, TxnStatus>, summary: &mut RecoverySummary) -> Result<()> {
        for status in txn_map.values() {
            if status.state != TxnState::Committed {
                continue;
            }
            for record in &status.records {
                if !record.is_data() {
                    continue;
                }
                if self.redo_record(record)? {
                    summary.redo_applied += 1;
                }
            }
        }
        Ok(())
    }

    /// Re-applies one committed change. Returns false when the change was
    /// already present (or its table is unknown) and nothing was done.
    fn redo_record(&self, record: &LogRecord) -> Result<bool> {
        if !self.catalog.table_exists(&record.table) {
            eprintln!(
                "[recovery] skipping lsn {}: table '{}' not in catalog",
                record.lsn, record.table
            );
            return Ok(false);
        }
        let schema = self.catalog.schema(&record.table)?;
        let table = self.catalog.table(&record.table)?;
        let mut table = table.lock();
        let row_id = record.row_id as i64;

        match record.kind {
            LogKind::Insert => {
                if table.location_of(row_id).is_some() {
                    return Ok(false);
                }
                let mut row = decode_row(&record.after, &schema)
                    .wrap_err_with(|| format!("bad after-image at lsn {}", record.lsn))?;
                table.insert(&mut row)?;
                Ok(true)
            }
            LogKind::Update => {
                let row = decode_row(&record.after, &schema)
                    .wrap_err_with(|| format!("bad after-image at lsn {}", record.lsn))?;
                if table.location_of(row_id).is_some() {
                    table.update(row_id, &row)?;
                } else {
                    let mut row = row;
                    row.set_row_id(row_id);
                    table.insert(&mut row)?;
                }
                Ok(true)
            }
            LogKind::Delete => {
                if table.location_of(row_id).is_none() {
                    return Ok(false);
                }
                table.delete(row_id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn undo(&self, txn_map: &BTreeMap<u64, TxnStatus>, summary: &mut RecoverySummary) -> Result<()> {
        for (&txn_id, status) in txn_map {
            if status.state != TxnState::Active {
                continue;
            }
            for record in status.records.iter().rev() {
                if !record.is_data() || record.kind == LogKind::Compensate {
                    continue;
                }
                if self.undo_record(record)? {
                    summary.undo_applied += 1;
                }
            }
            self.wal.log_rollback(txn_id);
            summary.rolled_back_txns += 1;
        }
        Ok(())
    }

    /// Applies the inverse of one change from a crashed transaction and
    /// logs a Compensate record describing what was undone.
    fn undo_record(&self, record: &LogRecord) -> Result<bool> {
        if !self.catalog.table_exists(&record.table) {
            return Ok(false);
        }
        let schema = self.catalog.schema(&record.table)?;
        let table = self.catalog.table(&record.table)?;
        let mut table = table.lock();
        let row_id = record.row_id as i64;

        let undone = match record.kind {
            LogKind::Insert => {
                // Inverse of insert: delete, when the row made it to disk.
                if table.location_of(row_id).is_some() {
                    table.delete(row_id)?;
                    self.wal.append(LogRecord::data(
                        LogKind::Compensate,
                        record.txn_id,
                        &record.table,
                        record.row_id,
                        record.after.clone(),
                        Vec::new(),
                    ));
                    true
                } else {
                    false
                }
            }
            LogKind::Update => {
                // Inverse of update: restore the before-image.
                let before = decode_row(&record.before, &schema)
                    .wrap_err_with(|| format!("bad before-image at lsn {}", record.lsn))?;
                if table.location_of(row_id).is_some() {
                    table.update(row_id, &before)?;
                    self.wal.append(LogRecord::data(
                        LogKind::Compensate,
                        record.txn_id,
                        &record.table,
                        record.row_id,
                        record.after.clone(),
                        record.before.clone(),
                    ));
                    true
                } else {
                    false
                }
            }
            LogKind::Delete => {
                // Inverse of delete: re-insert the before-image.
                if table.location_of(row_id).is_none() {
                    let mut before = decode_row(&record.before, &schema)
                        .wrap_err_with(|| format!("bad before-image at lsn {}", record.lsn))?;
                    before.set_row_id(row_id);
                    table.insert(&mut before)?;
                    self.wal.append(LogRecord::data(
                        LogKind::Compensate,
                        record.txn_id,
                        &record.table,
                        record.row_id,
                        Vec::new(),
                        record.before.clone(),
                    ));
                    true
                } else {
                    false
                }
            }
            _ => false,
        };
        Ok(undone)
    }
}
