//! # Pager
//!
//! File-backed page I/O. Page `id` lives at byte offset `id * PAGE_SIZE`.
//! The backing file is opened create-if-absent, read-write; writing a page
//! past the current end of file extends it. There is no page cache — every
//! read is a positional read, and callers provide their own
//! synchronization (each table owns its pager exclusively).

use crate::config::PAGE_SIZE;
use crate::storage::SlottedPage;
use eyre::{ensure, Result, WrapErr};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct Pager {
    file: File,
    path: PathBuf,
    num_pages: u32,
}

impl Pager {
    /// Opens (or creates) the backing file and derives the page count
    /// from its current length.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .wrap_err_with(|| format!("failed to open table file at {:?}", path))?;

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat table file at {:?}", path))?
            .len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages: (len / PAGE_SIZE as u64) as u32,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn read_page(&mut self, page_id: u32) -> Result<SlottedPage> {
        ensure!(
            page_id < self.num_pages,
            "page {} out of range: file has {} pages",
            page_id,
            self.num_pages
        );

        self.file
            .seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;

        let mut data = Box::new([0u8; PAGE_SIZE]);
        self.file
            .read_exact(&mut data[..])
            .wrap_err_with(|| format!("failed to read page {} from {:?}", page_id, self.path))?;

        Ok(SlottedPage::from_bytes(data))
    }

    /// Writes the page at its slot, extending the file when `page_id` is
    /// the next unallocated page.
    pub fn write_page(&mut self, page_id: u32, page: &SlottedPage) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;

        self.file
            .write_all(&page.as_bytes()[..])
            .wrap_err_with(|| format!("failed to write page {} to {:?}", page_id, self.path))?;

        if page_id >= self.num_pages {
            self.num_pages = page_id + 1;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync table file {:?}", self.path))
    }

    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_file_has_zero_pages() {
        let dir = tempdir().unwrap();
        let pager = Pager::open(&dir.path().join("t.db")).unwrap();
        assert_eq!(pager.num_pages(), 0);
    }

    #[test]
    fn write_extends_and_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let mut pager = Pager::open(&path).unwrap();

        let mut page = SlottedPage::new();
        page.insert_row(b"hello").unwrap();
        pager.write_page(0, &page).unwrap();
        assert_eq!(pager.num_pages(), 1);

        let read = pager.read_page(0).unwrap();
        assert_eq!(read.get_row(0).unwrap(), b"hello");
    }

    #[test]
    fn page_count_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let mut pager = Pager::open(&path).unwrap();
            pager.write_page(0, &SlottedPage::new()).unwrap();
            pager.write_page(1, &SlottedPage::new()).unwrap();
            pager.close().unwrap();
        }
        let pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages(), 2);
    }

    #[test]
    fn reading_past_eof_is_an_error() {
        let dir = tempdir().unwrap();
        let mut pager = Pager::open(&dir.path().join("t.db")).unwrap();
        assert!(pager.read_page(0).is_err());
    }
}
