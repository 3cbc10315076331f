//! Serial types are how SQLite encodes the storage class of one record
//! column. This module turns a `(serial_type, bytes)` pair, as produced by
//! `record::ValueIterator`, into a displayable [`Value`].
//!
//! Unlike the teacher, this tool never executes queries or interprets a
//! column's declared SQL type affinity, so there's no cast-to-schema-type
//! step here, just storage-class decoding, which is all a page inspector
//! needs.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error reading value bytes: {0}")]
    Io(#[from] std::io::Error),
    #[error("Value bytes were not valid UTF-8: {0}")]
    InvalidStringEncoding(#[from] std::string::FromUtf8Error),
    #[error("Reserved serial type code {0}.")]
    ReservedSerialType(i64),
}

/// One column's decoded storage-class value. Corresponds to SQLite's
/// storage classes (https://www.sqlite.org/datatype3.html#storage_classes_and_datatypes),
/// not to SQL type affinities.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Names a serial type for debug/REPL display. Not a SQL type name.
pub fn typecode_to_string(serial_type: i64) -> String {
    match serial_type {
        0 => "null".to_string(),
        1 => "int8".to_string(),
        2 => "int16".to_string(),
        3 => "int24".to_string(),
        4 => "int32".to_string(),
        5 => "int48".to_string(),
        6 => "int64".to_string(),
        7 => "float64".to_string(),
        8 => "const0".to_string(),
        9 => "const1".to_string(),
        10 | 11 => format!("reserved({})", serial_type),
        x if x >= 12 && x % 2 == 0 => format!("blob[{}]", (x as usize - 12) / 2),
        x if x >= 12 => format!("text[{}]", (x as usize - 13) / 2),
        _ => format!("invalid({})", serial_type),
    }
}

/// Decodes `data` (exactly the bytes belonging to this column, as sliced by
/// `record::ValueIterator`) according to `serial_type`.
///
/// Reserved types (10, 11) are already reduced to a zero-length slice by the
/// caller; decoding one here is always an error, surfaced so the REPL can
/// print it alongside the warning `ValueIterator` already recorded.
pub fn to_value(serial_type: i64, data: &[u8]) -> Result<Value, Error> {
    let mut c = std::io::Cursor::new(data);
    match serial_type {
        0 => Ok(Value::Null),
        1 => Ok(Value::Int(c.read_i8()? as i64)),
        2 => Ok(Value::Int(c.read_i16::<BigEndian>()? as i64)),
        3 => {
            let mut bytes = [0_u8; 4];
            c.read_exact(&mut bytes[1..])?;
            bytes[0] = if bytes[1] & 0b1000_0000 > 0 { 0xff } else { 0 };
            Ok(Value::Int(i32::from_be_bytes(bytes) as i64))
        }
        4 => Ok(Value::Int(c.read_i32::<BigEndian>()? as i64)),
        5 => {
            let mut bytes = [0_u8; 8];
            c.read_exact(&mut bytes[2..])?;
            bytes[0] = if bytes[2] & 0b1000_0000 > 0 { 0xff } else { 0 };
            bytes[1] = bytes[0];
            Ok(Value::Int(i64::from_be_bytes(bytes)))
        }
        6 => Ok(Value::Int(c.read_i64::<BigEndian>()?)),
        7 => Ok(Value::Real(c.read_f64::<BigEndian>()?)),
        8 => Ok(Value::Int(0)),
        9 => Ok(Value::Int(1)),
        10 | 11 => Err(Error::ReservedSerialType(serial_type)),
        x if x >= 12 && x % 2 == 0 => {
            let mut buf = vec![0_u8; (x as usize - 12) / 2];
            c.read_exact(&mut buf)?;
            Ok(Value::Blob(buf))
        }
        x if x >= 12 => {
            let mut buf = vec![0_u8; (x as usize - 13) / 2];
            c.read_exact(&mut buf)?;
            Ok(Value::Text(String::from_utf8(buf)?))
        }
        _ => Err(Error::ReservedSerialType(serial_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null() {
        assert_eq!(to_value(0, b"").unwrap(), Value::Null);
    }

    #[test]
    fn test_one_byte_int() {
        assert_eq!(to_value(1, &[0x7f]).unwrap(), Value::Int(127));
        assert_eq!(to_value(1, &[0xff]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_three_byte_int_sign_extends() {
        assert_eq!(to_value(3, &[0xff, 0xff, 0xff]).unwrap(), Value::Int(-1));
        assert_eq!(to_value(3, &[0x00, 0x01, 0x00]).unwrap(), Value::Int(256));
    }

    #[test]
    fn test_six_byte_int_sign_extends() {
        assert_eq!(to_value(5, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap(), Value::Int(-1));
        assert_eq!(to_value(5, &[0, 0, 0, 0, 0, 1]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_float() {
        let bytes = 3.1415_f64.to_be_bytes();
        assert_eq!(to_value(7, &bytes).unwrap(), Value::Real(3.1415));
    }

    #[test]
    fn test_constants() {
        assert_eq!(to_value(8, b"").unwrap(), Value::Int(0));
        assert_eq!(to_value(9, b"").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_text_and_blob() {
        assert_eq!(to_value(19, b"Foo").unwrap(), Value::Text("Foo".to_string()));
        assert_eq!(to_value(18, &[0, 1, 0xff]).unwrap(), Value::Blob(vec![0, 1, 0xff]));
    }

    #[test]
    fn test_reserved_is_error() {
        assert!(matches!(to_value(10, b""), Err(Error::ReservedSerialType(10))));
        assert!(matches!(to_value(11, b""), Err(Error::ReservedSerialType(11))));
    }

    #[test]
    fn test_typecode_to_string() {
        assert_eq!(typecode_to_string(0), "null");
        assert_eq!(typecode_to_string(19), "text[3]");
        assert_eq!(typecode_to_string(18), "blob[3]");
        assert_eq!(typecode_to_string(10), "reserved(10)");
    }
}
