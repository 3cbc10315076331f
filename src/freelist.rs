//! freelist decodes the chain of free pages a database keeps around for
//! reuse: trunk pages (a next-trunk pointer plus an array of leaf page
//! numbers) and leaf pages (otherwise-unused pages that may still carry
//! stale bytes worth inspecting).
//!
//! Grounded on the `FreeTrunkPage`/`FreeLeafPage` classes of the Python
//! original this tool reimplements: the `8 + 4n` leaf-pointer offset below
//! is the fix for a historical off-by-one that indexed leaf pointers at
//! plain `4n`, which silently shifted every leaf number but the first.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::page::Page;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Truncated page: could not read freelist trunk header.")]
    TruncatedTrunkHeader,
    #[error("Trunk page {0} claims {1} leaf pointers, more than fit in a page of size {2}; rejecting as implausible.")]
    ImplausibleLeafCount(usize, u32, usize),
}

/// A decoded freelist trunk page.
#[derive(Debug, Clone)]
pub struct Trunk {
    pub page_number: usize,
    pub next_trunk: u32,
    pub leaf_pages: Vec<u32>,
}

/// Whether a freelist leaf page's bytes are all zero (the expected,
/// unremarkable case) or carry leftover content from before it was freed.
#[derive(Debug, Clone)]
pub enum LeafCheck {
    Clean,
    Dirty(Vec<u8>),
}

/// Parses `page` as a freelist trunk page.
///
/// Leaf pointer `n` (0-based) lives at byte offset `8 + 4*n`, not `4*n` as
/// a naive transcription of "4 bytes per pointer, starting after the header"
/// might suggest; the header itself is 8 bytes (next-trunk u32, leaf-count
/// u32) and comes first.
pub fn parse_trunk(page: &Page) -> Result<Trunk, Error> {
    let bytes = page.bytes;
    let start = page.btree_header_start();
    if bytes.len() < start + 8 {
        return Err(Error::TruncatedTrunkHeader);
    }
    let mut c = Cursor::new(&bytes[start..]);
    let next_trunk = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedTrunkHeader)?;
    let leaf_count = c.read_u32::<BigEndian>().map_err(|_| Error::TruncatedTrunkHeader)?;

    let max_plausible = (page.bytes.len() / 4).saturating_sub(2) as u32;
    if leaf_count > max_plausible {
        return Err(Error::ImplausibleLeafCount(page.number, leaf_count, page.bytes.len()));
    }

    let mut leaf_pages = Vec::with_capacity(leaf_count as usize);
    for n in 0..leaf_count as usize {
        let off = start + 8 + 4 * n;
        if off + 4 > bytes.len() {
            break;
        }
        leaf_pages.push(u32::from_be_bytes(bytes[off..off + 4].try_into().unwrap()));
    }

    // A second, cruder implausibility signal the original tool also uses:
    // an all-zero trio of leading leaf entries on a trunk that claims to
    // have any leaves at all usually means this is really an unrelated
    // zeroed page, not a trunk.
    if leaf_pages.len() >= 3 && leaf_pages[0..3].iter().all(|&p| p == 0) {
        return Err(Error::ImplausibleLeafCount(page.number, leaf_count, page.bytes.len()));
    }

    Ok(Trunk {
        page_number: page.number,
        next_trunk,
        leaf_pages,
    })
}

/// A freelist leaf page carries no structure of its own: it's just
/// whatever bytes were left behind when it was freed. `Clean` if they're
/// all zero.
pub fn check_leaf(page: &Page) -> LeafCheck {
    let start = page.btree_header_start();
    let body = &page.bytes[start..];
    if body.iter().all(|&b| b == 0) {
        LeafCheck::Clean
    } else {
        LeafCheck::Dirty(body.to_vec())
    }
}

/// Walks the freelist starting at `first_trunk` (the file header's
/// `first_freelist_trunk` field; 0 means the database has no free pages),
/// following `next_trunk` pointers until 0 or a cycle. Stops (without
/// erroring) on the first implausible or already-visited trunk, so a
/// corrupt chain surfaces as a short, reported list rather than a hang.
pub fn walk_trunks<'a>(
    db: &'a crate::page::Database,
    first_trunk: u32,
) -> Vec<Result<Trunk, Error>> {
    let mut out = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut next = first_trunk;
    while next != 0 {
        if !visited.insert(next) {
            break;
        }
        let page = match db.page(next as usize) {
            Ok(p) => p,
            Err(_) => break,
        };
        match parse_trunk(&page) {
            Ok(trunk) => {
                next = trunk.next_trunk;
                out.push(Ok(trunk));
            }
            Err(e) => {
                out.push(Err(e));
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Database;

    fn minimal_db_bytes(page_size: u16, num_pages: u32) -> Vec<u8> {
        let mut v = vec![0_u8; page_size as usize * num_pages as usize];
        v[0..16].copy_from_slice(b"SQLite format 3\0");
        v[16..18].copy_from_slice(&page_size.to_be_bytes());
        v[18] = 1;
        v[19] = 1;
        v[21] = 64;
        v[22] = 32;
        v[23] = 32;
        v[28..32].copy_from_slice(&num_pages.to_be_bytes());
        v[44..48].copy_from_slice(&4_u32.to_be_bytes());
        v[100] = 0x0d;
        v
    }

    #[test]
    fn test_parse_trunk_leaf_pointer_offset() {
        let mut bytes = minimal_db_bytes(512, 3);
        // Page 2 (offset 512) is a trunk with 2 leaves: pages 7 and 9.
        let base = 512;
        bytes[base..base + 4].copy_from_slice(&0_u32.to_be_bytes()); // no next trunk
        bytes[base + 4..base + 8].copy_from_slice(&2_u32.to_be_bytes());
        bytes[base + 8..base + 12].copy_from_slice(&7_u32.to_be_bytes());
        bytes[base + 12..base + 16].copy_from_slice(&9_u32.to_be_bytes());
        let db = Database::from_bytes(bytes).unwrap();
        let page = db.page(2).unwrap();
        let trunk = parse_trunk(&page).unwrap();
        assert_eq!(trunk.next_trunk, 0);
        assert_eq!(trunk.leaf_pages, vec![7, 9]);
    }

    #[test]
    fn test_implausible_leaf_count_rejected() {
        let mut bytes = minimal_db_bytes(512, 2);
        let base = 512;
        bytes[base + 4..base + 8].copy_from_slice(&10_000_u32.to_be_bytes());
        let db = Database::from_bytes(bytes).unwrap();
        let page = db.page(2).unwrap();
        assert!(matches!(parse_trunk(&page), Err(Error::ImplausibleLeafCount(2, 10_000, 512))));
    }

    #[test]
    fn test_clean_leaf_check() {
        let bytes = minimal_db_bytes(512, 2);
        let db = Database::from_bytes(bytes).unwrap();
        let page = db.page(2).unwrap();
        assert!(matches!(check_leaf(&page), LeafCheck::Clean));
    }

    #[test]
    fn test_dirty_leaf_check() {
        let mut bytes = minimal_db_bytes(512, 2);
        bytes[512] = 0xab;
        let db = Database::from_bytes(bytes).unwrap();
        let page = db.page(2).unwrap();
        assert!(matches!(check_leaf(&page), LeafCheck::Dirty(_)));
    }

    #[test]
    fn test_walk_trunks_follows_chain() {
        let mut bytes = minimal_db_bytes(512, 3);
        // Page 2 -> Page 3 -> none.
        bytes[512..516].copy_from_slice(&3_u32.to_be_bytes());
        bytes[516..520].copy_from_slice(&0_u32.to_be_bytes());
        bytes[1024..1028].copy_from_slice(&0_u32.to_be_bytes());
        bytes[1028..1032].copy_from_slice(&0_u32.to_be_bytes());
        let db = Database::from_bytes(bytes).unwrap();
        let trunks = walk_trunks(&db, 2);
        assert_eq!(trunks.len(), 2);
        assert!(trunks.iter().all(|r| r.is_ok()));
    }
}
