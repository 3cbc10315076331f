//! master reads page 1's `sqlite_schema` (née `sqlite_master`) table: the
//! `(type, name, tbl_name, rootpage, sql)` rows that name every other table
//! and index's root page.
//!
//! This tool reads only that one table, never a user schema beyond it, per
//! the crate-level non-goal on query execution.

use crate::btree::cell::{Cell, CellIterator};
use crate::btree::header as bheader;
use crate::page::Database;
use crate::record::ValueIterator;
use crate::serial_type;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error loading page 1: {0}")]
    Page(#[from] crate::page::Error),
    #[error("Page 1's b-tree header could not be read: {0}")]
    Header(#[from] bheader::Error),
    #[error("Page 1 is an interior page; multi-page schema tables aren't supported by this reader.")]
    MasterMultiPageUnsupported,
    #[error("Error walking page 1's cell-pointer array: {0}")]
    Cell(#[from] crate::btree::cell::Error),
    #[error("Error decoding a schema row's column: {0}")]
    Value(#[from] serial_type::Error),
}

/// One row of `sqlite_schema`, reduced to the two columns a page inspector
/// needs: its name and the root page of the b-tree it describes.
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub name: String,
    pub rootpage: i64,
}

/// Reads the schema table from page 1. Returns `MasterMultiPageUnsupported`
/// if page 1 is an interior page (per spec, this version only understands a
/// single-page schema table).
pub fn read_schema(db: &Database) -> Result<Vec<SchemaEntry>, Error> {
    let page = db.page(1)?;
    let header = bheader::parse(&page, page.btree_header_start())?;
    if header.page_type.is_interior() {
        return Err(Error::MasterMultiPageUnsupported);
    }

    let mut entries = Vec::new();
    for cell in CellIterator::new(&page, &header)? {
        let cell = cell?;
        if let Cell::TableLeaf { payload, .. } = cell {
            let columns: Vec<_> = ValueIterator::new(payload).collect();
            // columns: 0=type, 1=name, 2=tbl_name, 3=rootpage, 4=sql
            if columns.len() < 4 {
                continue;
            }
            let (name_type, name_bytes) = columns[1];
            let (rootpage_type, rootpage_bytes) = columns[3];
            let name = match serial_type::to_value(name_type, name_bytes)? {
                serial_type::Value::Text(s) => s,
                _ => continue,
            };
            let rootpage = match serial_type::to_value(rootpage_type, rootpage_bytes)? {
                serial_type::Value::Int(i) => i,
                _ => continue,
            };
            entries.push(SchemaEntry { name, rootpage });
        }
    }
    Ok(entries)
}
