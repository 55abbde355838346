//! # Heap Table
//!
//! Multi-page append storage over a [`Pager`]. Rows go on the last page
//! until it reports [`PageError::Full`], at which point a fresh page is
//! allocated. A `row_id -> (page, slot)` index makes point lookups cheap;
//! it is rebuilt from the pages on open.
//!
//! Updates are delete-and-reinsert: the old slot is tombstoned and the
//! new bytes land on the same page when they fit, otherwise on a new
//! page. Deletes tombstone the slot and drop the index entry. Tombstoned
//! bytes are never compacted.

use crate::records::{decode_row, Row};
use crate::schema::Schema;
use crate::storage::{PageError, Pager, SlottedPage};
use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use std::fmt;

/// Location of a live row inside the table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    pub page_id: u32,
    pub slot_id: u16,
}

/// Typed error for update/delete/find on an unknown row id, so callers
/// can distinguish "not found" from I/O failures via `downcast_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowNotFound(pub i64);

impl fmt::Display for RowNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} not found", self.0)
    }
}

impl std::error::Error for RowNotFound {}

pub struct HeapTable {
    name: String,
    schema: Schema,
    pager: Pager,
    num_pages: u32,
    next_row_id: i64,
    row_index: HashMap<i64, RowLocation>,
}

impl HeapTable {
    /// Opens the table over `pager`, rebuilding the row index from every
    /// live slot and advancing `next_row_id` past the largest row id seen.
    pub fn open(name: impl Into<String>, schema: Schema, pager: Pager) -> Result<Self> {
        let num_pages = pager.num_pages();
        let mut table = Self {
            name: name.into(),
            schema,
            pager,
            num_pages,
            next_row_id: 1,
            row_index: HashMap::new(),
        };
        table.rebuild_index()?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn next_row_id(&self) -> i64 {
        self.next_row_id
    }

    /// Number of live rows (the row index tracks exactly those).
    pub fn row_count(&self) -> usize {
        self.row_index.len()
    }

    pub fn location_of(&self, row_id: i64) -> Option<RowLocation> {
        self.row_index.get(&row_id).copied()
    }

    pub fn rebuild_index(&mut self) -> Result<()> {
        self.row_index.clear();
        let mut max_row_id = 0i64;

        for page_id in 0..self.num_pages {
            let page = self.pager.read_page(page_id)?;
            for slot_id in 0..page.row_count() {
                let row_data = match page.get_row(slot_id) {
                    Ok(data) => data,
                    Err(PageError::SlotDeleted) => continue,
                    Err(e) => {
                        return Err(e).wrap_err_with(|| {
                            format!("corrupt slot {} on page {}", slot_id, page_id)
                        })
                    }
                };
                let row = decode_row(row_data, &self.schema).wrap_err_with(|| {
                    format!(
                        "failed to decode row at page {} slot {} of table '{}'",
                        page_id, slot_id, self.name
                    )
                })?;
                self.row_index
                    .insert(row.row_id(), RowLocation { page_id, slot_id });
                max_row_id = max_row_id.max(row.row_id());
            }
        }

        self.next_row_id = max_row_id + 1;
        Ok(())
    }

    /// Inserts the row, assigning a row id when the caller left it zero.
    /// An explicit row id is honored and advances the high-water mark.
    pub fn insert(&mut self, row: &mut Row) -> Result<RowLocation> {
        if row.row_id() == 0 {
            row.set_row_id(self.next_row_id);
            self.next_row_id += 1;
        } else if row.row_id() >= self.next_row_id {
            self.next_row_id = row.row_id() + 1;
        }
        let row_data = row.encode();

        if self.num_pages > 0 {
            let page_id = self.num_pages - 1;
            let mut page = self.pager.read_page(page_id)?;
            match page.insert_row(&row_data) {
                Ok(slot_id) => {
                    self.pager.write_page(page_id, &page)?;
                    let location = RowLocation { page_id, slot_id };
                    self.row_index.insert(row.row_id(), location);
                    return Ok(location);
                }
                Err(PageError::Full) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.insert_on_new_page(row.row_id(), &row_data)
    }

    fn insert_on_new_page(&mut self, row_id: i64, row_data: &[u8]) -> Result<RowLocation> {
        let mut page = SlottedPage::new();
        let slot_id = page.insert_row(row_data).wrap_err_with(|| {
            format!(
                "row of {} bytes does not fit on an empty page",
                row_data.len()
            )
        })?;
        let page_id = self.num_pages;
        self.pager.write_page(page_id, &page)?;
        self.num_pages += 1;
        let location = RowLocation { page_id, slot_id };
        self.row_index.insert(row_id, location);
        Ok(location)
    }

    /// All live rows, in page order and slot order within a page.
    pub fn scan(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for page_id in 0..self.num_pages {
            let page = self.pager.read_page(page_id)?;
            for slot_id in 0..page.row_count() {
                match page.get_row(slot_id) {
                    Ok(data) => rows.push(decode_row(data, &self.schema)?),
                    Err(PageError::SlotDeleted) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(rows)
    }

    pub fn find_by_row_id(&mut self, row_id: i64) -> Result<Row> {
        let location = self.row_index.get(&row_id).copied().ok_or(RowNotFound(row_id))?;
        let page = self.pager.read_page(location.page_id)?;
        let data = page.get_row(location.slot_id)?;
        decode_row(data, &self.schema)
    }

    /// Replaces the row in place (same page when it fits, new page
    /// otherwise). Returns the old row for the caller's before-image.
    pub fn update(&mut self, row_id: i64, new_row: &Row) -> Result<Row> {
        let location = self.row_index.get(&row_id).copied().ok_or(RowNotFound(row_id))?;
        let mut page = self.pager.read_page(location.page_id)?;

        let old_row = decode_row(page.get_row(location.slot_id)?, &self.schema)?;

        let mut replacement = new_row.clone();
        replacement.set_row_id(row_id);
        let new_data = replacement.encode();

        page.delete_row(location.slot_id)?;
        match page.insert_row(&new_data) {
            Ok(slot_id) => {
                self.pager.write_page(location.page_id, &page)?;
                self.row_index.insert(
                    row_id,
                    RowLocation {
                        page_id: location.page_id,
                        slot_id,
                    },
                );
            }
            Err(PageError::Full) => {
                // Persist the tombstone, then spill to a fresh page.
                self.pager.write_page(location.page_id, &page)?;
                self.insert_on_new_page(row_id, &new_data)?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(old_row)
    }

    /// Tombstones the row and removes it from the index. Returns the old
    /// row for the caller's before-image.
    pub fn delete(&mut self, row_id: i64) -> Result<Row> {
        let location = self.row_index.get(&row_id).copied().ok_or(RowNotFound(row_id))?;
        let mut page = self.pager.read_page(location.page_id)?;

        let old_row = decode_row(page.get_row(location.slot_id)?, &self.schema)?;
        page.delete_row(location.slot_id)?;
        self.pager.write_page(location.page_id, &page)?;
        self.row_index.remove(&row_id);

        Ok(old_row)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.pager.sync()
    }

    pub fn close(self) -> Result<()> {
        self.pager.close()
    }
}
