//! # Storage Layer
//!
//! The storage layer is three pieces, leaves first:
//!
//! - [`SlottedPage`]: a fixed 4096-byte page with a forward-growing slot
//!   directory and a backward-growing row area. Slot ids are stable;
//!   deletion tombstones the slot and never reclaims bytes.
//! - [`Pager`]: positional page I/O against a create-if-absent file. One
//!   page id maps to one `PAGE_SIZE` region at `id * PAGE_SIZE`. No cache;
//!   every read hits the file.
//! - [`HeapTable`]: multi-page append storage with a row-id index,
//!   scan in page/slot order, delete-and-reinsert updates and tombstone
//!   deletes. `PageError::Full` is absorbed here by allocating a new page.
//!
//! External synchronization is the caller's responsibility: the catalog
//! wraps each table in a mutex and serializes page access through it.

mod heap;
mod page;
mod pager;

pub use heap::{HeapTable, RowLocation, RowNotFound};
pub use page::{PageError, SlottedPage};
pub use pager::Pager;

pub use crate::config::{PAGE_HEADER_SIZE, PAGE_SIZE, SLOT_SIZE, TOMBSTONE_OFFSET};
