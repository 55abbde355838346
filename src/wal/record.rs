//! Log record layout and binary codec.
//!
//! Each record serializes as a fixed header followed by three
//! variable-length fields and a checksum trailer:
//!
//! ```text
//! +--------------------+-----------+--------------+--------------+----------+
//! | RecordHeader (32)  | table     | before image | after image  | crc (8)  |
//! |                    | (per hdr) | (u32 len +)  | (u32 len +)  |          |
//! +--------------------+-----------+--------------+--------------+----------+
//! ```
//!
//! The CRC-64/ECMA-182 trailer covers every byte before it. A record that
//! fails the checksum is reported as corruption, not silently skipped —
//! the WAL below a committed transaction must be trustworthy.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{bail, ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::WAL_RECORD_HEADER_SIZE;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// What a log record describes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Insert = 0,
    Update = 1,
    Delete = 2,
    Begin = 3,
    Commit = 4,
    Rollback = 5,
    Checkpoint = 6,
    /// Written by recovery while undoing a crashed transaction.
    Compensate = 7,
}

impl LogKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(LogKind::Insert),
            1 => Some(LogKind::Update),
            2 => Some(LogKind::Delete),
            3 => Some(LogKind::Begin),
            4 => Some(LogKind::Commit),
            5 => Some(LogKind::Rollback),
            6 => Some(LogKind::Checkpoint),
            7 => Some(LogKind::Compensate),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct RecordHeader {
    lsn: u64,
    txn_id: u64,
    row_id: u64,
    kind: u8,
    _reserved: [u8; 3],
    table_len: u16,
    _pad: u16,
}

const _: () = assert!(size_of::<RecordHeader>() == WAL_RECORD_HEADER_SIZE);

/// One entry of the write-ahead log. `lsn` is assigned by the WAL on
/// append; everything else is filled by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub lsn: u64,
    pub txn_id: u64,
    pub kind: LogKind,
    pub table: String,
    pub row_id: u64,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

impl LogRecord {
    /// A marker record (Begin/Commit/Rollback/Checkpoint) carrying no
    /// table or row images.
    pub fn marker(kind: LogKind, txn_id: u64) -> Self {
        Self {
            lsn: 0,
            txn_id,
            kind,
            table: String::new(),
            row_id: 0,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// A data record describing one row change.
    pub fn data(
        kind: LogKind,
        txn_id: u64,
        table: impl Into<String>,
        row_id: u64,
        before: Vec<u8>,
        after: Vec<u8>,
    ) -> Self {
        Self {
            lsn: 0,
            txn_id,
            kind,
            table: table.into(),
            row_id,
            before,
            after,
        }
    }

    /// True for Insert/Update/Delete/Compensate records that touch a row.
    pub fn is_data(&self) -> bool {
        matches!(
            self.kind,
            LogKind::Insert | LogKind::Update | LogKind::Delete | LogKind::Compensate
        )
    }

    pub fn serialize(&self) -> Vec<u8> {
        let header = RecordHeader {
            lsn: self.lsn,
            txn_id: self.txn_id,
            row_id: self.row_id,
            kind: self.kind as u8,
            _reserved: [0; 3],
            table_len: self.table.len() as u16,
            _pad: 0,
        };

        let mut buf = Vec::with_capacity(
            WAL_RECORD_HEADER_SIZE + self.table.len() + 8 + self.before.len() + self.after.len() + 8,
        );
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(self.table.as_bytes());
        buf.extend_from_slice(&(self.before.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.before);
        buf.extend_from_slice(&(self.after.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.after);

        let crc = CRC64.checksum(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= WAL_RECORD_HEADER_SIZE + 8,
            "WAL record truncated: {} bytes",
            data.len()
        );

        let crc_offset = data.len() - 8;
        let stored_crc = u64::from_le_bytes(data[crc_offset..].try_into().unwrap());
        let computed_crc = CRC64.checksum(&data[..crc_offset]);
        ensure!(
            stored_crc == computed_crc,
            "WAL record checksum mismatch: stored {:#018x}, computed {:#018x}",
            stored_crc,
            computed_crc
        );

        let header = RecordHeader::read_from_bytes(&data[..WAL_RECORD_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("invalid WAL record header: {:?}", e))?;

        let kind = match LogKind::from_byte(header.kind) {
            Some(kind) => kind,
            None => bail!("unknown WAL record kind {:#04x}", header.kind),
        };

        let mut offset = WAL_RECORD_HEADER_SIZE;
        let table_len = header.table_len as usize;
        ensure!(
            offset + table_len <= crc_offset,
            "WAL record table name overruns the record"
        );
        let table = std::str::from_utf8(&data[offset..offset + table_len])
            .map_err(|e| eyre::eyre!("WAL table name is not valid UTF-8: {}", e))?
            .to_string();
        offset += table_len;

        let (before, consumed) = read_image(&data[offset..crc_offset])?;
        offset += consumed;
        let (after, consumed) = read_image(&data[offset..crc_offset])?;
        offset += consumed;
        ensure!(
            offset == crc_offset,
            "WAL record has {} trailing bytes",
            crc_offset - offset
        );

        Ok(Self {
            lsn: header.lsn,
            txn_id: header.txn_id,
            kind,
            table,
            row_id: header.row_id,
            before,
            after,
        })
    }
}

fn read_image(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    ensure!(data.len() >= 4, "WAL record image length truncated");
    let len = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
    ensure!(
        data.len() >= 4 + len,
        "WAL record image truncated: want {} bytes, have {}",
        len,
        data.len() - 4
    );
    Ok((data[4..4 + len].to_vec(), 4 + len))
}
