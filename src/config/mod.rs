//! # Configuration Constants
//!
//! Centralizes the on-disk layout constants. Values that depend on each
//! other live together so a change to one is visible next to the values it
//! constrains.
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> PAGE_HEADER_SIZE (6 bytes: row_count, free_start, free_end)
//!       │
//!       ├─> SLOT_SIZE (4 bytes per slot: offset, size)
//!       │
//!       └─> PAGE_CAPACITY (derived: PAGE_SIZE - PAGE_HEADER_SIZE)
//! ```
//!
//! A row insert needs `SLOT_SIZE + row_len` free bytes. The largest row a
//! page can hold is therefore `PAGE_CAPACITY - SLOT_SIZE`.

/// Size of every page in a table file. Offsets in slot entries are u16, so
/// this must stay below 0xFFFF (the tombstone sentinel).
pub const PAGE_SIZE: usize = 4096;

/// Page header: `row_count: u16`, `free_space_start: u16`,
/// `free_space_end: u16`.
pub const PAGE_HEADER_SIZE: usize = 6;

/// One slot directory entry: `offset: u16`, `size: u16`.
pub const SLOT_SIZE: usize = 4;

/// Slot offset value marking a logically deleted row.
pub const TOMBSTONE_OFFSET: u16 = 0xFFFF;

/// Bytes available to slots plus row data on a fresh page.
pub const PAGE_CAPACITY: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// WAL record frame: a u32 little-endian length precedes each record.
pub const WAL_FRAME_PREFIX_SIZE: usize = 4;

/// Fixed portion of a serialized WAL record (before the variable-length
/// table name and row images).
pub const WAL_RECORD_HEADER_SIZE: usize = 32;

/// File name of the write-ahead log inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.log";

/// Extension used for table heap files inside the data directory.
pub const TABLE_FILE_EXT: &str = "db";

const _: () = assert!(
    PAGE_SIZE < TOMBSTONE_OFFSET as usize,
    "slot offsets are u16 and 0xFFFF is reserved for tombstones"
);

const _: () = assert!(PAGE_CAPACITY == PAGE_SIZE - PAGE_HEADER_SIZE);
