//! page owns the whole file image and hands out zero-copy `Page` views over
//! it, one per 1-based page number.
//!
//! A `Database` reads the whole file into one buffer up front (mirroring
//! `StoredDb::open` in the teacher crate) rather than demand-paging, since a
//! forensic pass typically ends up touching most pages anyway and this tool
//! isn't concerned with a write path that would need page-level locking.

use std::io::Read as _;

use crate::header::{self, Header};

pub type PageNum = usize;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error accessing database file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error in database header: {0}")]
    Header(#[from] header::Error),
    #[error("Page number {0} is out of range (database has {1} pages).")]
    PageNumberBeyondLimits(PageNum, usize),
}

/// First byte of a page body, before any btree-specific interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    TableLeaf,
    TableInterior,
    IndexLeaf,
    IndexInterior,
    /// First byte is 0x00: either a freelist trunk, a freelist leaf, or an
    /// unused page. `freelist::classify` resolves which.
    CandidateFree,
    Unknown(u8),
}

impl PageKind {
    pub fn from_byte(b: u8) -> PageKind {
        match b {
            0x02 => PageKind::IndexInterior,
            0x05 => PageKind::TableInterior,
            0x0a => PageKind::IndexLeaf,
            0x0d => PageKind::TableLeaf,
            0x00 => PageKind::CandidateFree,
            other => PageKind::Unknown(other),
        }
    }

    pub fn is_btree(&self) -> bool {
        matches!(
            self,
            PageKind::TableLeaf | PageKind::TableInterior | PageKind::IndexLeaf | PageKind::IndexInterior
        )
    }
}

/// A zero-copy view of one page: its number, its absolute file offset, and
/// the byte slice of the full `page_size`-byte window starting at that
/// offset.
///
/// This always includes the first 100 bytes of the file on page 1, the
/// file-format spec's "alternate, equivalent" loader design (§4.4): rather
/// than slicing page 1's body short and subtracting a 100-byte `negOffset`
/// from every in-page offset before indexing, this slab carries the header
/// bytes too, so a stored page-relative offset is always a valid index into
/// `bytes` unchanged. `neg_offset` is kept on the struct (always 0 here) so
/// call sites that want to print "the offset as SQLite's own format.html
/// describes it" don't need a special case for page 1.
pub struct Page<'a> {
    pub number: PageNum,
    pub absolute_offset: usize,
    pub neg_offset: usize,
    pub bytes: &'a [u8],
}

impl<'a> Page<'a> {
    pub fn kind(&self) -> PageKind {
        let first = if self.number == 1 {
            self.bytes[header::HEADER_BYTES]
        } else {
            self.bytes[0]
        };
        PageKind::from_byte(first)
    }

    /// Start of the b-tree page header within `bytes`: 100 on page 1 (past
    /// the file header), 0 elsewhere.
    pub fn btree_header_start(&self) -> usize {
        if self.number == 1 {
            header::HEADER_BYTES
        } else {
            0
        }
    }
}

pub struct Database {
    buf: Vec<u8>,
    pub header: Header,
    pub page_size: usize,
    /// Number of pages the loader could actually materialize from the file,
    /// which may differ from `header.db_size_pages` if the file is
    /// truncated or padded relative to its own header.
    pub actual_page_count: usize,
    pub length_mismatch: Option<String>,
}

impl Database {
    /// Reads `path` fully into memory read-only and decodes its header.
    pub fn open(path: &str) -> Result<Database, Error> {
        let mut f = std::fs::OpenOptions::new()
            .read(true)
            .write(false)
            .create(false)
            .open(path)
            .map_err(Error::Io)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).map_err(Error::Io)?;
        Self::from_bytes(buf)
    }

    pub fn from_bytes(buf: Vec<u8>) -> Result<Database, Error> {
        let header = header::parse(&buf)?;
        let page_size = header.page_size as usize;
        let actual_page_count = if page_size == 0 { 0 } else { buf.len() / page_size };
        let declared = header.db_size_pages as usize;
        let length_mismatch = if declared != actual_page_count {
            Some(format!(
                "header declares {} pages but the file contains {} whole pages of size {}",
                declared, actual_page_count, page_size
            ))
        } else {
            None
        };
        Ok(Database {
            buf,
            header,
            page_size,
            actual_page_count,
            length_mismatch,
        })
    }

    pub fn page_count(&self) -> usize {
        self.actual_page_count
    }

    /// Returns the page-sized byte window for 1-based page number `pn`.
    pub fn page(&self, pn: PageNum) -> Result<Page<'_>, Error> {
        if pn == 0 || pn > self.actual_page_count {
            return Err(Error::PageNumberBeyondLimits(pn, self.actual_page_count));
        }
        let start = (pn - 1) * self.page_size;
        let end = start + self.page_size;
        let neg_offset = 0;
        Ok(Page {
            number: pn,
            absolute_offset: start,
            neg_offset,
            bytes: &self.buf[start..end],
        })
    }
}
