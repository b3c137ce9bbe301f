//! Fixed-width big-endian integers (1, 2 and 4 bytes)
//!
//! Encoding goes straight through `BufMut::put_u8/put_u16/put_u32`; only decoding
//! needs bounds checks so that a short buffer is reported instead of panicking.

use crate::error::{MqttError, Result};
use bytes::Buf;

fn ensure_remaining<B: Buf>(buf: &B, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient bytes for {what}: expected {needed}, got {}",
            buf.remaining()
        )));
    }
    Ok(())
}

/// Decodes a single byte
///
/// # Errors
///
/// Returns an error if the buffer is empty
pub fn decode_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    ensure_remaining(buf, 1, "byte")?;
    Ok(buf.get_u8())
}

/// Decodes a big-endian two byte integer
///
/// # Errors
///
/// Returns an error if fewer than 2 bytes remain
pub fn decode_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    ensure_remaining(buf, 2, "two byte integer")?;
    Ok(buf.get_u16())
}

/// Decodes a big-endian four byte integer
///
/// # Errors
///
/// Returns an error if fewer than 4 bytes remain
pub fn decode_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    ensure_remaining(buf, 4, "four byte integer")?;
    Ok(buf.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let mut cursor = &data[..];
        assert_eq!(decode_u8(&mut cursor).unwrap(), 0x12);
        assert_eq!(decode_u16(&mut cursor).unwrap(), 0x3456);
        assert_eq!(decode_u32(&mut cursor).unwrap(), 0x789A_BCDE);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_short_input_is_not_consumed() {
        let data = [0x00, 0x01, 0x02];
        let mut cursor = &data[..];
        assert!(decode_u32(&mut cursor).is_err());
        assert_eq!(cursor.len(), 3);
        assert!(decode_u8(&mut &[][..]).is_err());
    }
}
