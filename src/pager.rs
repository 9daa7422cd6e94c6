// Page-based I/O layer between the B-tree and the filesystem.
//
// The pager reads and writes fixed-size pages from a single file and keeps
// every loaded page in a fixed-capacity slab indexed by page number. Pages
// are loaded on first access and written back when the table is closed;
// there is no mid-session eviction.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{DbError, Result};

/// A page is the unit of I/O: a fixed 4096-byte block.
pub const PAGE_SIZE: usize = 4096;

/// Upper bound on pages per table. Page numbers are allocated by bumping
/// a counter, so this caps the table size at 100 pages.
pub const TABLE_MAX_PAGES: usize = 100;

pub type PageBuf = [u8; PAGE_SIZE];

#[derive(Debug)]
pub struct Pager {
    file: File,
    file_length: u64,
    num_pages: u32,
    pages: Vec<Option<Box<PageBuf>>>,
}

impl Pager {
    /// Open or create the database file.
    ///
    /// The file must contain a whole number of pages; anything else means
    /// a torn write or foreign file and is rejected as corrupt.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_length = file.seek(SeekFrom::End(0))?;
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(DbError::Corrupt(
                "db file is not a whole number of pages".into(),
            ));
        }

        Ok(Self {
            file,
            file_length,
            num_pages: (file_length / PAGE_SIZE as u64) as u32,
            pages: (0..TABLE_MAX_PAGES).map(|_| None).collect(),
        })
    }

    /// Number of pages the table occupies, counting pages not yet flushed.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Page number for a new allocation. Pages are appended; there is no
    /// free list. The page materializes on the first `get_page` call.
    pub fn unused_page_num(&self) -> u32 {
        self.num_pages
    }

    /// Fetch the in-memory buffer for page `page_num`, loading it from the
    /// file on a cache miss. A page past the end of the file starts zeroed.
    pub fn get_page(&mut self, page_num: u32) -> Result<&mut PageBuf> {
        let index = page_num as usize;
        if index >= TABLE_MAX_PAGES {
            return Err(DbError::Internal(format!(
                "tried to fetch page number out of bounds: {page_num} >= {TABLE_MAX_PAGES}"
            )));
        }

        if self.pages[index].is_none() {
            self.load_page(page_num)?;
        }

        Ok(self.pages[index].as_deref_mut().unwrap())
    }

    /// Write page `page_num` back to its file offset. The page must be
    /// loaded; flushing an absent page is a bug in the caller.
    pub fn flush(&mut self, page_num: u32) -> Result<()> {
        let index = page_num as usize;
        let page = self.pages[index]
            .as_ref()
            .ok_or_else(|| DbError::Internal(format!("tried to flush missing page {page_num}")))?;

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(page.as_ref())?;
        Ok(())
    }

    /// Flush every loaded page in ascending page-number order, release the
    /// buffers, and sync the file.
    pub fn close(&mut self) -> Result<()> {
        for page_num in 0..self.num_pages {
            if self.pages[page_num as usize].is_some() {
                self.flush(page_num)?;
                self.pages[page_num as usize] = None;
            }
        }
        self.file.sync_all()?;
        Ok(())
    }

    fn load_page(&mut self, page_num: u32) -> Result<()> {
        let mut page: Box<PageBuf> = Box::new([0u8; PAGE_SIZE]);

        // Only pages within the persisted range have bytes on disk.
        let pages_on_file = (self.file_length / PAGE_SIZE as u64) as u32;
        if page_num < pages_on_file {
            self.file
                .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
            self.file.read_exact(page.as_mut())?;
        }

        self.pages[page_num as usize] = Some(page);
        if page_num >= self.num_pages {
            self.num_pages = page_num + 1;
        }
        Ok(())
    }
}
