//! # Write-Ahead Log
//!
//! An appending record log providing durability for the transaction
//! layer. Records accumulate in an in-memory buffer and reach disk on
//! [`Wal::flush`], framed as a `u32` little-endian length followed by the
//! serialized record bytes:
//!
//! ```text
//! +---------+----------------+---------+----------------+ ...
//! | len u32 | record bytes   | len u32 | record bytes   | ...
//! +---------+----------------+---------+----------------+ ...
//! ```
//!
//! ## Protocol
//!
//! 1. `append` assigns the next LSN under the lock and buffers the record
//! 2. `flush` writes every buffered frame, fsyncs, then clears the buffer
//! 3. a commit is durable exactly when its `flush` returns
//!
//! ## Concurrency
//!
//! A single mutex serializes append, flush, read and checkpoint. The
//! fsync happens inside the lock, which serializes commits; group commit
//! would relax this but is out of scope here.
//!
//! ## Recovery contract
//!
//! `read` is a whole-file scan returning records in LSN order. On open
//! the WAL replays itself to find the last assigned LSN and continues
//! from there (`next_lsn = last + 1`, or 1 for an empty log).

mod record;

pub use record::{LogKind, LogRecord};

use crate::config::WAL_FRAME_PREFIX_SIZE;
use eyre::{Result, WrapErr};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

struct WalInner {
    file: File,
    next_lsn: u64,
    buffer: Vec<LogRecord>,
}

pub struct Wal {
    path: PathBuf,
    inner: Mutex<WalInner>,
}

impl Wal {
    /// Opens (or creates) the log at `path` and positions `next_lsn`
    /// after the last record on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open WAL at {:?}", path))?;

        let wal = Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WalInner {
                file,
                next_lsn: 1,
                buffer: Vec::new(),
            }),
        };

        let last_lsn = wal.read()?.last().map(|r| r.lsn).unwrap_or(0);
        wal.inner.lock().next_lsn = last_lsn + 1;
        Ok(wal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Assigns the next LSN to `record` and buffers it. The record is not
    /// durable until [`Wal::flush`] returns.
    pub fn append(&self, mut record: LogRecord) -> u64 {
        let mut inner = self.inner.lock();
        record.lsn = inner.next_lsn;
        inner.next_lsn += 1;
        let lsn = record.lsn;
        inner.buffer.push(record);
        lsn
    }

    pub fn log_insert(&self, txn_id: u64, table: &str, row_id: u64, after: Vec<u8>) -> u64 {
        self.append(LogRecord::data(
            LogKind::Insert,
            txn_id,
            table,
            row_id,
            Vec::new(),
            after,
        ))
    }

    pub fn log_update(
        &self,
        txn_id: u64,
        table: &str,
        row_id: u64,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> u64 {
        self.append(LogRecord::data(
            LogKind::Update,
            txn_id,
            table,
            row_id,
            before,
            after,
        ))
    }

    pub fn log_delete(&self, txn_id: u64, table: &str, row_id: u64, before: Vec<u8>) -> u64 {
        self.append(LogRecord::data(
            LogKind::Delete,
            txn_id,
            table,
            row_id,
            before,
            Vec::new(),
        ))
    }

    pub fn log_begin(&self, txn_id: u64) -> u64 {
        self.append(LogRecord::marker(LogKind::Begin, txn_id))
    }

    pub fn log_commit(&self, txn_id: u64) -> u64 {
        self.append(LogRecord::marker(LogKind::Commit, txn_id))
    }

    pub fn log_rollback(&self, txn_id: u64) -> u64 {
        self.append(LogRecord::marker(LogKind::Rollback, txn_id))
    }

    /// LSN the next appended record will receive.
    pub fn next_lsn(&self) -> u64 {
        self.inner.lock().next_lsn
    }

    /// Writes every buffered record with its length frame, then fsyncs.
    pub fn flush(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.buffer.is_empty() {
            return Ok(());
        }

        for record in &inner.buffer {
            let bytes = record.serialize();
            inner
                .file
                .write_all(&(bytes.len() as u32).to_le_bytes())
                .wrap_err("failed to write WAL frame length")?;
            inner
                .file
                .write_all(&bytes)
                .wrap_err("failed to write WAL record")?;
        }

        inner
            .file
            .sync_all()
            .wrap_err("failed to fsync WAL after flush")?;
        inner.buffer.clear();
        Ok(())
    }

    /// Whole-file scan of the records on disk, in LSN order. Buffered,
    /// unflushed records are not included.
    pub fn read(&self) -> Result<Vec<LogRecord>> {
        let mut inner = self.inner.lock();
        inner
            .file
            .seek(SeekFrom::Start(0))
            .wrap_err("failed to seek to WAL start")?;

        let mut records = Vec::new();
        loop {
            let mut len_bytes = [0u8; WAL_FRAME_PREFIX_SIZE];
            match inner.file.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).wrap_err("failed to read WAL frame length"),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;

            let mut record_bytes = vec![0u8; len];
            inner
                .file
                .read_exact(&mut record_bytes)
                .wrap_err("failed to read WAL record body")?;
            records.push(LogRecord::deserialize(&record_bytes)?);
        }
        Ok(records)
    }

    /// Flushes, appends a Checkpoint record under the system txn id 0,
    /// and flushes again.
    pub fn checkpoint(&self) -> Result<()> {
        self.flush()?;
        self.append(LogRecord::marker(LogKind::Checkpoint, 0));
        self.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lsns_are_assigned_monotonically_from_one() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        assert_eq!(wal.log_begin(1), 1);
        assert_eq!(wal.log_insert(1, "users", 100, b"alice".to_vec()), 2);
        assert_eq!(wal.log_commit(1), 3);
        assert_eq!(wal.next_lsn(), 4);
    }

    #[test]
    fn flushed_records_read_back_in_order() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        wal.log_begin(1);
        wal.log_insert(1, "users", 100, b"alice".to_vec());
        wal.log_commit(1);
        wal.flush().unwrap();

        let records = wal.read().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.lsn).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(records[1].kind, LogKind::Insert);
        assert_eq!(records[1].table, "users");
        assert_eq!(records[1].after, b"alice");
    }

    #[test]
    fn unflushed_records_are_not_on_disk() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        wal.log_begin(1);
        assert!(wal.read().unwrap().is_empty());
        wal.flush().unwrap();
        assert_eq!(wal.read().unwrap().len(), 1);
    }

    #[test]
    fn reopen_continues_lsn_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let wal = Wal::open(&path).unwrap();
            wal.log_begin(1);
            wal.log_commit(1);
            wal.flush().unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        assert_eq!(wal.next_lsn(), 3);
        assert_eq!(wal.log_begin(2), 3);
    }

    #[test]
    fn empty_wal_starts_at_lsn_one() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        assert_eq!(wal.next_lsn(), 1);
        assert!(wal.read().unwrap().is_empty());
    }

    #[test]
    fn checkpoint_appends_a_system_record() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        wal.log_begin(1);
        wal.checkpoint().unwrap();

        let records = wal.read().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, LogKind::Checkpoint);
        assert_eq!(records[1].txn_id, 0);
    }

    #[test]
    fn flush_of_empty_buffer_is_a_no_op() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log")).unwrap();
        wal.flush().unwrap();
        assert!(wal.read().unwrap().is_empty());
    }
}
