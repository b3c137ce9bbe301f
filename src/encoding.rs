//! Wire primitives shared by every control packet
//!
//! Each primitive is a pair of plain functions: `encode_*` appends exactly
//! `*_len` bytes, `decode_*` consumes a prefix of the input and leaves the input
//! untouched when it fails. Packets are built by calling them in sequence.

pub mod binary;
pub mod integer;
pub mod string;
pub mod variable_int;

use crate::error::{MqttError, Result};
use bytes::{Buf, Bytes};

pub use binary::{binary_len, decode_binary, encode_binary};
pub use integer::{decode_u16, decode_u32, decode_u8};
pub use string::{decode_string, encode_string, string_len};
pub use variable_int::{
    decode_variable_int, encode_variable_int, encoded_variable_int_len, variable_int_len,
    VariableInt, VARIABLE_INT_MAX,
};

/// Runs `decode` over exactly the next `len` bytes of `buf`
///
/// Fails without consuming anything if `len` exceeds the remaining input, if the
/// sub-decoder fails, or if it leaves part of the declared range unread.
///
/// # Errors
///
/// Returns `MqttError::MalformedPacket` for a short or partially consumed range and
/// forwards any error of the sub-decoder.
pub fn decode_scoped<B, T, F>(buf: &mut B, len: usize, decode: F) -> Result<T>
where
    B: Buf + Clone,
    F: FnOnce(&mut Bytes) -> Result<T>,
{
    let mut probe = buf.clone();
    if probe.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Scoped length {len} exceeds remaining {}",
            probe.remaining()
        )));
    }

    let mut scope = probe.copy_to_bytes(len);
    let value = decode(&mut scope)?;
    if scope.has_remaining() {
        return Err(MqttError::MalformedPacket(format!(
            "{} trailing bytes in scoped range",
            scope.remaining()
        )));
    }

    *buf = probe;
    Ok(value)
}

/// Like [`decode_scoped`] with the length given by a leading variable byte integer
///
/// # Errors
///
/// Same as [`decode_scoped`], plus a malformed length prefix.
pub fn decode_varint_scoped<B, T, F>(buf: &mut B, decode: F) -> Result<T>
where
    B: Buf + Clone,
    F: FnOnce(&mut Bytes) -> Result<T>,
{
    let mut probe = buf.clone();
    let len = decode_variable_int(&mut probe)? as usize;
    let value = decode_scoped(&mut probe, len, decode)?;
    *buf = probe;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_requires_exact_consumption() {
        let data = [0x00, 0x01, 0x02, 0x03];
        let mut cursor = &data[..];
        let result = decode_scoped(&mut cursor, 3, |b| decode_u16(b));
        assert!(result.is_err());
        assert_eq!(cursor.len(), 4);

        let value = decode_scoped(&mut cursor, 2, |b| decode_u16(b)).unwrap();
        assert_eq!(value, 0x0001);
        assert_eq!(cursor, &[0x02, 0x03]);
    }

    #[test]
    fn test_scoped_length_beyond_input() {
        let data = [0x00];
        let mut cursor = &data[..];
        assert!(decode_scoped(&mut cursor, 2, |b| decode_u16(b)).is_err());
    }

    #[test]
    fn test_varint_scoped() {
        let data = [0x02, 0xAB, 0xCD, 0xEF];
        let mut cursor = &data[..];
        let value = decode_varint_scoped(&mut cursor, |b| decode_u16(b)).unwrap();
        assert_eq!(value, 0xABCD);
        assert_eq!(cursor, &[0xEF]);
    }
}
