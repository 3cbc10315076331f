//! recovery reconstructs what it can about deleted rows still sitting in a
//! b-tree page: the freeblock chain SQLite threads through a page's unused
//! space, and the unallocated gap between the cell-pointer array and the
//! cell content area.
//!
//! Grounded on `read_removed_data`/`check` in the Python original this tool
//! reimplements. The historical bug noted for this routine, comparing a
//! freeblock's terminator against a `negOffset`-adjusted value instead of
//! the raw page-relative one, can't recur here: `Page::bytes` always spans
//! the full page (see `page::Page`'s doc comment), so every offset in this
//! module is already page-relative with nothing to subtract.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::btree::header::Header as BtreeHeader;
use crate::page::Page;

/// One freeblock recovered from the chain: its offset within the page, its
/// total size (including the 4-byte next-pointer/size header), and the
/// bytes it covers (the whole freeblock, header included, since the header
/// itself may be meaningful leftover data on a corrupted page).
#[derive(Debug, Clone)]
pub struct Freeblock {
    pub offset: usize,
    pub size: usize,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub freeblocks: Vec<Freeblock>,
    /// Set if the chain pointed somewhere outside the page; recovery stops
    /// at that point rather than guessing.
    pub corrupt_chain: bool,
    /// The unused region between the end of the cell-pointer array and the
    /// start of cell content, if any byte in it is non-zero, a likely
    /// reservoir of bytes from recently deleted cells that predate the
    /// current cell-pointer array.
    pub unallocated_gap: Option<Vec<u8>>,
}

/// Walks the freeblock chain of a single b-tree page starting at its
/// header's `first_freeblock` field (0 = none), and separately inspects the
/// unallocated gap between the cell-pointer array and the cell content area.
pub fn recover(page: &Page, header: &BtreeHeader) -> RecoveryReport {
    let bytes = page.bytes;
    let page_start = page.btree_header_start();
    let page_end = bytes.len();

    let mut freeblocks = Vec::new();
    let mut corrupt_chain = false;
    let mut next = header.first_freeblock as usize;
    let mut visited = std::collections::HashSet::new();
    while next != 0 {
        if next < page_start || next + 4 > page_end || !visited.insert(next) {
            corrupt_chain = next != 0;
            break;
        }
        let mut c = Cursor::new(&bytes[next..]);
        let next_ptr = match c.read_u16::<BigEndian>() {
            Ok(v) => v as usize,
            Err(_) => {
                corrupt_chain = true;
                break;
            }
        };
        let size = match c.read_u16::<BigEndian>() {
            Ok(v) => v as usize,
            Err(_) => {
                corrupt_chain = true;
                break;
            }
        };
        let end = next + size.max(4);
        if end > page_end {
            corrupt_chain = true;
            break;
        }
        freeblocks.push(Freeblock {
            offset: next,
            size,
            bytes: bytes[next..end].to_vec(),
        });
        next = next_ptr;
    }

    let gap_start = page_start + header.header_size() + 2 * header.cell_count as usize;
    let gap_end = (header.cell_content_start as usize).min(page_end);
    let unallocated_gap = if gap_start < gap_end {
        let region = &bytes[gap_start..gap_end];
        if region.iter().any(|&b| b != 0) {
            Some(region.to_vec())
        } else {
            None
        }
    } else {
        None
    };

    RecoveryReport {
        freeblocks,
        corrupt_chain,
        unallocated_gap,
    }
}
