//! header reads the 100-byte file header found at the start of every SQLite
//! database image.
//!
//! Unlike a writer, this decoder is lenient: anomalous field values are
//! reported (via the returned `warnings` and specific `Error` variants used
//! only for truly unreadable input) but never stop the decode, since the
//! whole point of this tool is post-mortem analysis of possibly-corrupt
//! images.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub const HEADER_BYTES: usize = 100;

const MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("File is shorter than the 100-byte header.")]
    TooShort,
}

/// The decoded file header, plus the raw bytes backing the handful of fields
/// this tool doesn't interpret further (auto-vacuum mode, encoding, etc.) and
/// a list of human-readable anomaly notes collected while parsing.
#[derive(Debug, Clone)]
pub struct Header {
    pub magic_ok: bool,
    pub page_size: u32,
    pub file_format_write_version: u8,
    pub file_format_read_version: u8,
    pub reserved_bytes_per_page: u8,
    pub change_counter: u32,
    pub db_size_pages: u32,
    pub first_freelist_trunk: u32,
    pub freelist_page_count: u32,
    pub max_payload_fraction: u8,
    pub min_payload_fraction: u8,
    pub leaf_payload_fraction: u8,
    pub schema_cookie: u32,
    pub schema_format: u32,
    pub raw_auto_vacuum: [u8; 4],
    pub raw_encoding: [u8; 4],
    pub raw_incremental_vacuum: [u8; 4],
    pub raw_version_valid_for: [u8; 4],
    pub raw_sqlite_version_number: [u8; 4],
    pub raw_magic: [u8; 16],
    pub warnings: Vec<String>,
}

/// Parses the first 100 bytes of a database file.
///
/// `page_size == 1` is normalized to 65536 before the power-of-two check, per
/// the file format spec. Any field the spec calls out as anomalous (bad
/// magic, a non-power-of-two page size, an implausible database size) is
/// recorded as a warning rather than treated as fatal.
pub fn parse(bytes: &[u8]) -> Result<Header, Error> {
    if bytes.len() < HEADER_BYTES {
        return Err(Error::TooShort);
    }
    let mut warnings = Vec::new();
    let mut c = Cursor::new(bytes);

    let mut magic = [0_u8; 16];
    c.read_exact(&mut magic).map_err(|_| Error::TooShort)?;
    let magic_ok = &magic == MAGIC;
    if !magic_ok {
        warnings.push("magic signature does not match \"SQLite format 3\\0\"".to_string());
    }

    let page_size_code = c.read_u16::<BigEndian>().map_err(|_| Error::TooShort)?;
    let page_size: u32 = if page_size_code == 1 {
        65536
    } else {
        page_size_code as u32
    };
    if !(page_size == 65536 || (512..=32768).contains(&page_size) && page_size.is_power_of_two()) {
        warnings.push(format!("non-standard page size: {}", page_size));
    }

    let file_format_write_version = c.read_u8().map_err(|_| Error::TooShort)?;
    let file_format_read_version = c.read_u8().map_err(|_| Error::TooShort)?;
    let reserved_bytes_per_page = c.read_u8().map_err(|_| Error::TooShort)?;
    let max_payload_fraction = c.read_u8().map_err(|_| Error::TooShort)?;
    let min_payload_fraction = c.read_u8().map_err(|_| Error::TooShort)?;
    let leaf_payload_fraction = c.read_u8().map_err(|_| Error::TooShort)?;

    let change_counter = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;
    let db_size_pages = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;
    if db_size_pages > 0x7fff_fffe {
        warnings.push(format!("non-standard database size: {} pages", db_size_pages));
    }

    let first_freelist_trunk = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;
    let freelist_page_count = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;
    let schema_cookie = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;
    let schema_format = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;

    let _default_page_cache_size = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;

    let mut raw_auto_vacuum = [0_u8; 4];
    c.read_exact(&mut raw_auto_vacuum).map_err(|_| Error::TooShort)?;
    let mut raw_encoding = [0_u8; 4];
    c.read_exact(&mut raw_encoding).map_err(|_| Error::TooShort)?;
    let _user_version = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;
    let mut raw_incremental_vacuum = [0_u8; 4];
    c.read_exact(&mut raw_incremental_vacuum).map_err(|_| Error::TooShort)?;
    let _application_id = c.read_u32::<BigEndian>().map_err(|_| Error::TooShort)?;

    let mut reserved = [0_u8; 20];
    c.read_exact(&mut reserved).map_err(|_| Error::TooShort)?;
    if reserved.iter().any(|&b| b != 0) {
        warnings.push("reserved-for-expansion region (bytes 72..92) is non-zero".to_string());
    }

    let mut raw_version_valid_for = [0_u8; 4];
    c.read_exact(&mut raw_version_valid_for).map_err(|_| Error::TooShort)?;
    let mut raw_sqlite_version_number = [0_u8; 4];
    c.read_exact(&mut raw_sqlite_version_number).map_err(|_| Error::TooShort)?;

    Ok(Header {
        magic_ok,
        page_size,
        file_format_write_version,
        file_format_read_version,
        reserved_bytes_per_page,
        change_counter,
        db_size_pages,
        first_freelist_trunk,
        freelist_page_count,
        max_payload_fraction,
        min_payload_fraction,
        leaf_payload_fraction,
        schema_cookie,
        schema_format,
        raw_auto_vacuum,
        raw_encoding,
        raw_incremental_vacuum,
        raw_version_valid_for,
        raw_sqlite_version_number,
        raw_magic: magic,
        warnings,
    })
}

impl Header {
    /// Decodes the magic bytes actually read from the file, not the
    /// expected constant, so a corrupt or non-SQLite file is reported
    /// truthfully instead of showing the correct signature regardless.
    pub fn signature_string(&self) -> String {
        String::from_utf8_lossy(&self.raw_magic).trim_end_matches('\0').to_string()
    }
}
