//! cell walks a b-tree page's cell-pointer array and decodes each entry into
//! a typed [`Cell`].
//!
//! Offsets stored in the cell-pointer array are page-relative everywhere
//! except page 1, where the file format spec treats them as absolute file
//! offsets instead (the first 100 bytes of page 1 belong to the file
//! header). Because `Page::bytes` is always the full `page_size`-byte window,
//! including, on page 1, those 100 header bytes, a stored offset is a
//! valid index into `bytes` as-is on every page; there is no `negOffset`
//! subtraction to get wrong here.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::header::Header as BtreeHeader;
use super::PageType;
use crate::page::Page;
use sqlite_varint::read_varint;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Cell pointer {0} (value {1}) is out of range for a page of {2} bytes.")]
    PointerOutOfRange(usize, usize, usize),
    #[error("Truncated cell at offset {0}: could not read its header.")]
    TruncatedCell(usize),
}

/// A decoded cell. `payload` is only the in-page prefix actually present;
/// see the `Overflow` edge case on [`CellIterator`].
#[derive(Debug, Clone)]
pub enum Cell<'a> {
    TableLeaf {
        rowid: i64,
        declared_payload_len: i64,
        payload: &'a [u8],
        truncated: bool,
    },
    TableInterior {
        left_child: u32,
        rowid: i64,
    },
    IndexLeaf {
        declared_payload_len: i64,
        payload: &'a [u8],
        truncated: bool,
    },
    IndexInterior {
        left_child: u32,
        declared_payload_len: i64,
        payload: &'a [u8],
        truncated: bool,
    },
}

impl<'a> Cell<'a> {
    /// The left-child pointer carried by interior cells, used by
    /// `traversal` to walk down the tree. `None` for leaf cells.
    pub fn left_child(&self) -> Option<u32> {
        match self {
            Cell::TableInterior { left_child, .. } => Some(*left_child),
            Cell::IndexInterior { left_child, .. } => Some(*left_child),
            _ => None,
        }
    }
}

/// Iterates the cells of one b-tree page in pointer-array order (left to
/// right / ascending key order).
pub struct CellIterator<'a> {
    page: &'a Page<'a>,
    page_type: PageType,
    offsets: Vec<usize>,
    idx: usize,
}

impl<'a> CellIterator<'a> {
    /// Reads the cell-pointer array (`header.cell_count` entries, starting
    /// right after the b-tree header) and prepares to decode each cell on
    /// demand.
    pub fn new(page: &'a Page<'a>, header: &BtreeHeader) -> Result<CellIterator<'a>, Error> {
        let start = page.btree_header_start() + header.header_size();
        let mut c = Cursor::new(&page.bytes[start..]);
        let mut offsets = Vec::with_capacity(header.cell_count as usize);
        for _ in 0..header.cell_count {
            let off = c
                .read_u16::<BigEndian>()
                .map_err(|_| Error::TruncatedCell(start))? as usize;
            if off >= page.bytes.len() {
                return Err(Error::PointerOutOfRange(offsets.len(), off, page.bytes.len()));
            }
            offsets.push(off);
        }
        Ok(CellIterator {
            page,
            page_type: header.page_type,
            offsets,
            idx: 0,
        })
    }

    /// Page-relative (or, on page 1, file-absolute) offsets of each cell, in
    /// pointer-array order, exposed so callers like `check()` can validate
    /// `cellContentStart <= offset < pageSize` without re-reading the array.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    fn decode_at(&self, offset: usize) -> Result<Cell<'a>, Error> {
        let bytes = self.page.bytes;
        match self.page_type {
            PageType::TableInterior => {
                if offset + 4 > bytes.len() {
                    return Err(Error::TruncatedCell(offset));
                }
                let left_child = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
                let (rowid, _) = read_varint(&bytes[offset + 4..]);
                Ok(Cell::TableInterior { left_child, rowid })
            }
            PageType::TableLeaf => {
                let (declared_payload_len, n1) = read_varint(&bytes[offset..]);
                let (rowid, n2) = read_varint(&bytes[offset + n1..]);
                let body_start = offset + n1 + n2;
                let (payload, truncated) = read_local_payload(bytes, body_start, declared_payload_len);
                Ok(Cell::TableLeaf {
                    rowid,
                    declared_payload_len,
                    payload,
                    truncated,
                })
            }
            PageType::IndexLeaf => {
                let (declared_payload_len, n1) = read_varint(&bytes[offset..]);
                let body_start = offset + n1;
                let (payload, truncated) = read_local_payload(bytes, body_start, declared_payload_len);
                Ok(Cell::IndexLeaf {
                    declared_payload_len,
                    payload,
                    truncated,
                })
            }
            PageType::IndexInterior => {
                if offset + 4 > bytes.len() {
                    return Err(Error::TruncatedCell(offset));
                }
                let left_child = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
                let (declared_payload_len, n1) = read_varint(&bytes[offset + 4..]);
                let body_start = offset + 4 + n1;
                let (payload, truncated) = read_local_payload(bytes, body_start, declared_payload_len);
                Ok(Cell::IndexInterior {
                    left_child,
                    declared_payload_len,
                    payload,
                    truncated,
                })
            }
        }
    }
}

/// Returns the in-page prefix of a payload declared to be `declared_len`
/// bytes long, starting at `body_start`. If the page doesn't have that many
/// bytes left, the prefix is truncated at the page boundary and `truncated`
/// is set. This tool never chases overflow pages, it just says so.
fn read_local_payload(bytes: &[u8], body_start: usize, declared_len: i64) -> (&[u8], bool) {
    if body_start > bytes.len() || declared_len < 0 {
        return (&bytes[bytes.len()..], true);
    }
    let available = bytes.len() - body_start;
    let declared = declared_len as usize;
    if declared <= available {
        (&bytes[body_start..body_start + declared], false)
    } else {
        (&bytes[body_start..], true)
    }
}

/// Returns the exclusive end offset of the cell stored at `offset`, on a
/// page of the given `page_type`, truncated at the page boundary the same
/// way `read_local_payload` truncates a payload. Used by
/// `btree::header::Header::check` to test cells for overlap and to sum
/// cell-occupied bytes for the page-accounting invariant, without
/// constructing a full `Cell`.
pub fn cell_end(bytes: &[u8], page_type: PageType, offset: usize) -> Option<usize> {
    match page_type {
        PageType::TableInterior => {
            if offset + 4 > bytes.len() {
                return None;
            }
            let (_, n) = read_varint(&bytes[offset + 4..]);
            Some(offset + 4 + n)
        }
        PageType::TableLeaf => {
            let (declared_len, n1) = read_varint(&bytes[offset..]);
            let (_, n2) = read_varint(&bytes[offset + n1..]);
            let body_start = offset + n1 + n2;
            let (payload, _) = read_local_payload(bytes, body_start, declared_len);
            Some(body_start + payload.len())
        }
        PageType::IndexLeaf => {
            let (declared_len, n1) = read_varint(&bytes[offset..]);
            let body_start = offset + n1;
            let (payload, _) = read_local_payload(bytes, body_start, declared_len);
            Some(body_start + payload.len())
        }
        PageType::IndexInterior => {
            if offset + 4 > bytes.len() {
                return None;
            }
            let (declared_len, n1) = read_varint(&bytes[offset + 4..]);
            let body_start = offset + 4 + n1;
            let (payload, _) = read_local_payload(bytes, body_start, declared_len);
            Some(body_start + payload.len())
        }
    }
}

impl<'a> Iterator for CellIterator<'a> {
    type Item = Result<Cell<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = *self.offsets.get(self.idx)?;
        self.idx += 1;
        Some(self.decode_at(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::header as bheader;

    // One table-leaf page, two cells, built by hand: cell pointer array at
    // offset 8 (leaf header size), cells placed at the tail of the page.
    fn table_leaf_page_bytes() -> Vec<u8> {
        let mut v = vec![0_u8; 512];
        v[0] = 0x0d;
        v[3..5].copy_from_slice(&2_u16.to_be_bytes());
        // cell 1 at 500: payload_len=2, rowid=7, payload=[0xaa, 0xbb]
        v[500] = 2;
        v[501] = 7;
        v[502] = 0xaa;
        v[503] = 0xbb;
        // cell 2 at 504: payload_len=1, rowid=8, payload=[0xcc]
        v[504] = 1;
        v[505] = 8;
        v[506] = 0xcc;
        v[5..7].copy_from_slice(&500_u16.to_be_bytes());
        v[8..10].copy_from_slice(&500_u16.to_be_bytes());
        v[10..12].copy_from_slice(&504_u16.to_be_bytes());
        v
    }

    #[test]
    fn test_table_leaf_cells_decode() {
        let bytes = table_leaf_page_bytes();
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = bheader::parse(&page, 0).unwrap();
        let cells: Vec<_> = CellIterator::new(&page, &h).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(cells.len(), 2);
        match &cells[0] {
            Cell::TableLeaf { rowid, declared_payload_len, payload, truncated } => {
                assert_eq!(*rowid, 7);
                assert_eq!(*declared_payload_len, 2);
                assert_eq!(*payload, &[0xaa, 0xbb]);
                assert!(!truncated);
            }
            other => panic!("wrong cell variant: {:?}", other),
        }
        match &cells[1] {
            Cell::TableLeaf { rowid, payload, .. } => {
                assert_eq!(*rowid, 8);
                assert_eq!(*payload, &[0xcc]);
            }
            other => panic!("wrong cell variant: {:?}", other),
        }
    }

    #[test]
    fn test_table_interior_cell_has_left_child() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x05;
        bytes[3..5].copy_from_slice(&1_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        bytes[8..12].copy_from_slice(&9_u32.to_be_bytes()); // rightmost pointer
        bytes[12..14].copy_from_slice(&500_u16.to_be_bytes());
        bytes[500..504].copy_from_slice(&3_u32.to_be_bytes());
        bytes[504] = 42; // rowid varint
        let page = Page { number: 3, absolute_offset: 1024, neg_offset: 0, bytes: &bytes };
        let h = bheader::parse(&page, 0).unwrap();
        let cells: Vec<_> = CellIterator::new(&page, &h).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].left_child(), Some(3));
        match &cells[0] {
            Cell::TableInterior { rowid, .. } => assert_eq!(*rowid, 42),
            other => panic!("wrong cell variant: {:?}", other),
        }
    }

    #[test]
    fn test_payload_exceeding_page_is_marked_truncated() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x0d;
        bytes[3..5].copy_from_slice(&1_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        bytes[8..10].copy_from_slice(&500_u16.to_be_bytes());
        // Declares a payload far larger than the 12 bytes actually left on
        // the page (512 - 500 = 12, minus the varint header bytes).
        bytes[500] = 0x81;
        bytes[501] = 0x00; // payload_len varint = 128
        bytes[502] = 1; // rowid
        let page = Page { number: 4, absolute_offset: 1536, neg_offset: 0, bytes: &bytes };
        let h = bheader::parse(&page, 0).unwrap();
        let cells: Vec<_> = CellIterator::new(&page, &h).unwrap().collect::<Result<_, _>>().unwrap();
        match &cells[0] {
            Cell::TableLeaf { declared_payload_len, truncated, payload, .. } => {
                assert_eq!(*declared_payload_len, 128);
                assert!(*truncated);
                assert_eq!(payload.len(), 512 - 503);
            }
            other => panic!("wrong cell variant: {:?}", other),
        }
    }

    #[test]
    fn test_pointer_out_of_range_is_rejected() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x0d;
        bytes[3..5].copy_from_slice(&1_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        bytes[8..10].copy_from_slice(&600_u16.to_be_bytes());
        let page = Page { number: 5, absolute_offset: 2048, neg_offset: 0, bytes: &bytes };
        let h = bheader::parse(&page, 0).unwrap();
        assert!(matches!(CellIterator::new(&page, &h), Err(Error::PointerOutOfRange(0, 600, 512))));
    }
}
