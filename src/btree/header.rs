//! header decodes the 8- or 12-byte b-tree page header that immediately
//! follows the file header on page 1 (or starts at byte 0 on every other
//! page).

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::PageType;
use crate::page::Page;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Page {0}'s first byte (0x{1:02x}) is not a recognized b-tree page type.")]
    UnknownPageKind(usize, u8),
    #[error("Truncated page: could not read b-tree header.")]
    TruncatedPage,
}

#[derive(Debug, Clone)]
pub struct Header {
    pub page_type: PageType,
    pub first_freeblock: u32,
    pub cell_count: u32,
    /// Start of the cell content area. A raw value of 0 has already been
    /// normalized to 65536 here.
    pub cell_content_start: u32,
    pub fragmented_free_bytes: u8,
    pub rightmost_pointer: Option<u32>,
}

impl Header {
    /// 8 for leaf pages, 12 for interior pages (due to the trailing
    /// rightmost-child pointer).
    pub fn header_size(&self) -> usize {
        if self.page_type.is_interior() {
            12
        } else {
            8
        }
    }

    /// Verifies the page-accounting invariants from the file format's own
    /// description of a well-formed page: every cell pointer lands in
    /// `[cellContentStart, pageSize)`, no two cells overlap, and the cell
    /// content area is fully accounted for by cell bytes, freeblock bytes,
    /// and the fragmented-free-byte count. Never panics on a corrupt page;
    /// violations are reported in the returned `CheckReport` instead.
    pub fn check(&self, page: &Page) -> CheckReport {
        let bytes = page.bytes;
        let page_size = bytes.len();
        let start = page.btree_header_start();
        let min_content_start = start + self.header_size() + 2 * self.cell_count as usize;
        let cell_content_start_in_range =
            (min_content_start..=page_size).contains(&(self.cell_content_start as usize));

        let array_start = start + self.header_size();
        let mut offsets = Vec::with_capacity(self.cell_count as usize);
        if bytes.len() >= array_start {
            let mut c = Cursor::new(&bytes[array_start..]);
            for _ in 0..self.cell_count {
                match c.read_u16::<BigEndian>() {
                    Ok(v) => offsets.push(v as usize),
                    Err(_) => break,
                }
            }
        }

        let mut pointer_violations = Vec::new();
        let mut spans: Vec<(usize, usize, usize)> = Vec::new();
        for (i, &off) in offsets.iter().enumerate() {
            if off < self.cell_content_start as usize || off >= page_size {
                pointer_violations.push(i);
                continue;
            }
            if let Some(end) = super::cell::cell_end(bytes, self.page_type, off) {
                spans.push((i, off, end));
            }
        }

        let mut overlaps = Vec::new();
        for a in 0..spans.len() {
            for b in (a + 1)..spans.len() {
                let (ia, sa, ea) = spans[a];
                let (ib, sb, eb) = spans[b];
                if sa < eb && sb < ea {
                    overlaps.push((ia, ib));
                }
            }
        }

        let cell_bytes_total: usize = spans.iter().map(|&(_, s, e)| e - s).sum();
        let freeblock_total = freeblock_byte_total(bytes, start, self.first_freeblock);
        let accounted = cell_bytes_total + freeblock_total + self.fragmented_free_bytes as usize;
        let expected = page_size.saturating_sub(self.cell_content_start as usize);

        CheckReport {
            cell_content_start_in_range,
            pointer_violations,
            overlaps,
            accounting_closes: accounted == expected,
            accounted_bytes: accounted,
            expected_bytes: expected,
        }
    }
}

/// Sum of every freeblock's declared size in the chain rooted at
/// `first_freeblock`, stopping on a cycle or an out-of-page pointer rather
/// than looping forever. Offsets are page-relative except on page 1, where
/// they're file-absolute like everything else on that page; `start` (0 or
/// 100) bounds how far back a pointer may legally point.
fn freeblock_byte_total(bytes: &[u8], start: usize, first_freeblock: u32) -> usize {
    let mut total = 0usize;
    let mut visited = std::collections::HashSet::new();
    let mut next = first_freeblock as usize;
    while next != 0 {
        if next < start || next + 4 > bytes.len() || !visited.insert(next) {
            break;
        }
        let mut c = Cursor::new(&bytes[next..]);
        let next_ptr = c.read_u16::<BigEndian>().unwrap_or(0) as usize;
        let size = c.read_u16::<BigEndian>().unwrap_or(0) as usize;
        total += size;
        next = next_ptr;
    }
    total
}

/// Result of [`Header::check`]. `is_clean()` is true iff every invariant
/// held; otherwise the individual fields say which ones didn't.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub cell_content_start_in_range: bool,
    pub pointer_violations: Vec<usize>,
    pub overlaps: Vec<(usize, usize)>,
    pub accounting_closes: bool,
    pub accounted_bytes: usize,
    pub expected_bytes: usize,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.cell_content_start_in_range
            && self.pointer_violations.is_empty()
            && self.overlaps.is_empty()
            && self.accounting_closes
    }
}

/// Decodes the b-tree header of `page`. `start` is the offset within
/// `page.bytes` where the header begins (100 on page 1, 0 elsewhere;
/// `page.btree_header_start()`).
pub fn parse(page: &Page, start: usize) -> Result<Header, Error> {
    let bytes = page.bytes;
    if bytes.len() < start + 8 {
        return Err(Error::TruncatedPage);
    }
    let mut c = Cursor::new(&bytes[start..]);
    let kind_byte = c.read_u8().map_err(|_| Error::TruncatedPage)?;
    let page_type = PageType::from_kind(crate::page::PageKind::from_byte(kind_byte))
        .ok_or(Error::UnknownPageKind(page.number, kind_byte))?;

    let first_freeblock = c.read_u16::<BigEndian>().map_err(|_| Error::TruncatedPage)? as u32;
    let cell_count = c.read_u16::<BigEndian>().map_err(|_| Error::TruncatedPage)? as u32;
    let cell_content_start = match c.read_u16::<BigEndian>().map_err(|_| Error::TruncatedPage)? {
        0 => 65536,
        x => x as u32,
    };
    let fragmented_free_bytes = c.read_u8().map_err(|_| Error::TruncatedPage)?;

    let rightmost_pointer = if page_type.is_interior() {
        if bytes.len() < start + 12 {
            return Err(Error::TruncatedPage);
        }
        Some(c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedPage)?)
    } else {
        None
    };

    Ok(Header {
        page_type,
        first_freeblock,
        cell_count,
        cell_content_start,
        fragmented_free_bytes,
        rightmost_pointer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    fn leaf_page_bytes() -> Vec<u8> {
        let mut v = vec![0_u8; 512];
        v[0] = 0x0d;
        v[1..3].copy_from_slice(&0_u16.to_be_bytes());
        v[3..5].copy_from_slice(&2_u16.to_be_bytes());
        v[5..7].copy_from_slice(&480_u16.to_be_bytes());
        v[7] = 0;
        v
    }

    #[test]
    fn test_parse_leaf_header() {
        let bytes = leaf_page_bytes();
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = parse(&page, 0).unwrap();
        assert_eq!(h.page_type, PageType::TableLeaf);
        assert_eq!(h.cell_count, 2);
        assert_eq!(h.cell_content_start, 480);
        assert_eq!(h.header_size(), 8);
        assert!(h.rightmost_pointer.is_none());
    }

    #[test]
    fn test_cell_content_start_zero_means_65536() {
        let mut bytes = leaf_page_bytes();
        bytes[5..7].copy_from_slice(&0_u16.to_be_bytes());
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = parse(&page, 0).unwrap();
        assert_eq!(h.cell_content_start, 65536);
    }

    #[test]
    fn test_parse_interior_header_has_rightmost_pointer() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x05;
        bytes[3..5].copy_from_slice(&1_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        bytes[8..12].copy_from_slice(&7_u32.to_be_bytes());
        let page = Page { number: 3, absolute_offset: 1024, neg_offset: 0, bytes: &bytes };
        let h = parse(&page, 0).unwrap();
        assert_eq!(h.page_type, PageType::TableInterior);
        assert_eq!(h.header_size(), 12);
        assert_eq!(h.rightmost_pointer, Some(7));
    }

    #[test]
    fn test_unknown_page_kind() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0xff;
        let page = Page { number: 4, absolute_offset: 1536, neg_offset: 0, bytes: &bytes };
        assert!(matches!(parse(&page, 0), Err(Error::UnknownPageKind(4, 0xff))));
    }

    #[test]
    fn test_check_passes_on_a_fully_accounted_page() {
        // One cell, exactly filling the cell content area, no freeblocks.
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x0d;
        bytes[3..5].copy_from_slice(&1_u16.to_be_bytes()); // cell_count
        bytes[5..7].copy_from_slice(&504_u16.to_be_bytes()); // cell_content_start
        bytes[8..10].copy_from_slice(&504_u16.to_be_bytes()); // cell pointer
        bytes[504] = 6; // payload_len varint = 6
        bytes[505] = 1; // rowid varint = 1
                         // bytes[506..512]: 6-byte payload, filling the page exactly.
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = parse(&page, 0).unwrap();
        let report = h.check(&page);
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.accounted_bytes, 8);
        assert_eq!(report.expected_bytes, 8);
    }

    #[test]
    fn test_check_detects_overlapping_cells() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x0d;
        bytes[3..5].copy_from_slice(&2_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        bytes[8..10].copy_from_slice(&500_u16.to_be_bytes());
        bytes[10..12].copy_from_slice(&502_u16.to_be_bytes());
        // Cell 0 at 500: payload_len=5, rowid=1, payload spans [502, 507).
        bytes[500] = 5;
        bytes[501] = 1;
        // Cell 1 at 502 (inside cell 0's payload): payload_len=1, rowid=9,
        // payload spans [504, 505) -- overlapping cell 0.
        bytes[502] = 1;
        bytes[503] = 9;
        bytes[504] = 0xaa;
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = parse(&page, 0).unwrap();
        let report = h.check(&page);
        assert!(!report.is_clean());
        assert_eq!(report.overlaps, vec![(0, 1)]);
    }

    #[test]
    fn test_check_detects_pointer_below_content_start() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x0d;
        bytes[3..5].copy_from_slice(&1_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        bytes[8..10].copy_from_slice(&100_u16.to_be_bytes()); // below cell_content_start
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = parse(&page, 0).unwrap();
        let report = h.check(&page);
        assert!(!report.is_clean());
        assert_eq!(report.pointer_violations, vec![0]);
    }
}
