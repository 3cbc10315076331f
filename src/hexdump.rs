//! hexdump renders a page as colored hex: the b-tree header in yellow, the
//! cell content area in red, everything else (the cell-pointer array and
//! any unallocated gap) left uncolored.
//!
//! Layout is 16 bytes per line with an 8-byte gap and an ASCII sidebar, in
//! the vein of the `sqlite-viz` dumper this tool draws on; the coloring
//! rule itself is the Python original's `print_page`.

use colored::Colorize;
use std::fmt::Write as _;

use crate::btree::header::Header as BtreeHeader;
use crate::page::Page;

/// Renders `page` as a hex dump, with absolute file offsets in the left
/// column (so page-1 lines read the same as every other page's: the file
/// offset, not a page-relative one).
pub fn dump(page: &Page, header: Option<&BtreeHeader>) -> String {
    let mut out = String::new();
    let bytes = page.bytes;
    let btree_start = page.btree_header_start();
    let header_end = header.map(|h| btree_start + h.header_size()).unwrap_or(btree_start);
    // cell_content_start is already file-absolute on page 1 (same convention
    // repl.rs and recovery.rs use it under), so it needs no btree_start shift.
    let data_start = header
        .map(|h| (h.cell_content_start as usize).min(bytes.len()))
        .unwrap_or(bytes.len());

    for (line_idx, chunk) in bytes.chunks(16).enumerate() {
        let line_start = line_idx * 16;
        write!(out, "{:08x} : ", page.absolute_offset + line_start).unwrap();
        for (i, b) in chunk.iter().enumerate() {
            let idx = line_start + i;
            let token = format!("{:02x} ", b);
            let colored = if idx < header_end {
                token.yellow().to_string()
            } else if idx >= data_start {
                token.red().to_string()
            } else {
                token
            };
            out.push_str(&colored);
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  ");
        for b in chunk {
            let c = *b as char;
            if c.is_ascii_graphic() || c == ' ' {
                out.push(c);
            } else {
                out.push('.');
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::header as bheader;

    #[test]
    fn test_dump_has_one_line_per_16_bytes() {
        let bytes = vec![0_u8; 32];
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let rendered = dump(&page, None);
        assert_eq!(rendered.lines().count(), 2);
    }

    #[test]
    fn test_dump_includes_absolute_offset() {
        let mut bytes = vec![0_u8; 512];
        bytes[0] = 0x0d;
        bytes[3..5].copy_from_slice(&0_u16.to_be_bytes());
        bytes[5..7].copy_from_slice(&500_u16.to_be_bytes());
        let page = Page { number: 2, absolute_offset: 512, neg_offset: 0, bytes: &bytes };
        let h = bheader::parse(&page, 0).unwrap();
        let rendered = dump(&page, Some(&h));
        assert!(rendered.starts_with("00000200"));
    }

    /// On page 1, `cell_content_start` is already a file-absolute offset (it
    /// counts from the start of the page, and page 1 starts at file offset
    /// 0). `data_start` must use it unmodified rather than shifting it by
    /// `btree_start` (100), or real cell-content bytes in the first 100
    /// bytes past the b-tree header get miscolored as unallocated.
    #[test]
    fn test_page_one_data_start_is_not_shifted_by_btree_start() {
        colored::control::set_override(true);
        let mut bytes = vec![0_u8; 512];
        bytes[crate::header::HEADER_BYTES] = 0x0d; // leaf page type at offset 100
        bytes[103..105].copy_from_slice(&0_u16.to_be_bytes()); // cell_count
        bytes[105..107].copy_from_slice(&400_u16.to_be_bytes()); // cell_content_start, file-absolute
        let page = Page { number: 1, absolute_offset: 0, neg_offset: 0, bytes: &bytes };
        let h = bheader::parse(&page, page.btree_header_start()).unwrap();
        assert_eq!(h.cell_content_start, 400);
        let rendered = dump(&page, Some(&h));
        // Byte 200 sits between the b-tree header (ends at 108) and
        // cell_content_start (400): it must not be colored red. The buggy
        // `btree_start + cell_content_start` computation (500) would have
        // colored it red.
        let line_200 = rendered.lines().nth(200 / 16).unwrap();
        assert!(!line_200.contains("\u{1b}[31m"), "byte 200 wrongly colored red: {:?}", line_200);
        // Byte 450 is past cell_content_start and must be colored red.
        let line_450 = rendered.lines().nth(450 / 16).unwrap();
        assert!(line_450.contains("\u{1b}[31m"), "byte 450 should be colored red: {:?}", line_450);
        colored::control::unset_override();
    }
}
