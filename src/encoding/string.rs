use crate::constants::limits::MAX_STRING_LENGTH;
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Encodes a UTF-8 string with a 2-byte length prefix
///
/// # MQTT String Format:
/// - 2 bytes: string length (big-endian)
/// - N bytes: UTF-8 encoded string data
///
/// # Errors
///
/// Returns an error if:
/// - The string contains null characters
/// - The string length exceeds maximum string length
pub fn encode_string<B: BufMut>(buf: &mut B, string: &str) -> Result<()> {
    if string.contains('\0') {
        return Err(MqttError::MalformedPacket(
            "String contains null character".to_string(),
        ));
    }

    let bytes = string.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        MqttError::MalformedPacket(format!(
            "String length {} exceeds maximum {MAX_STRING_LENGTH}",
            bytes.len()
        ))
    })?;

    buf.put_u16(len);
    buf.put_slice(bytes);
    Ok(())
}

/// Decodes a UTF-8 string with a 2-byte length prefix
///
/// Consumes exactly `2 + len` bytes on success and nothing on failure.
///
/// # Errors
///
/// Returns an error if:
/// - The declared length exceeds the remaining input
/// - String is not valid UTF-8
/// - String contains null characters
pub fn decode_string<B: Buf + Clone>(buf: &mut B) -> Result<String> {
    let mut probe = buf.clone();
    if probe.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient bytes for string length".to_string(),
        ));
    }

    let len = usize::from(probe.get_u16());
    if probe.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient bytes for string data: expected {len}, got {}",
            probe.remaining()
        )));
    }

    let mut bytes = vec![0u8; len];
    probe.copy_to_slice(&mut bytes);

    let string = String::from_utf8(bytes)
        .map_err(|e| MqttError::MalformedPacket(format!("Invalid UTF-8: {e}")))?;

    if string.contains('\0') {
        return Err(MqttError::MalformedPacket(
            "String contains null character".to_string(),
        ));
    }

    *buf = probe;
    Ok(string)
}

/// Calculates the encoded length of a string (2 bytes for length + string bytes)
#[must_use]
pub fn string_len(string: &str) -> usize {
    2 + string.len()
}
