use crate::constants::limits::MAX_BINARY_LENGTH;
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, Bytes};

/// Encodes binary data with a 2-byte length prefix
///
/// # Errors
///
/// Returns an error if the data length exceeds 65,535 bytes
pub fn encode_binary<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| {
        MqttError::MalformedPacket(format!(
            "Binary data length {} exceeds maximum {MAX_BINARY_LENGTH}",
            data.len()
        ))
    })?;

    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

/// Decodes binary data with a 2-byte length prefix, consuming nothing on failure
///
/// # Errors
///
/// Returns an error if the declared length exceeds the remaining input
pub fn decode_binary<B: Buf + Clone>(buf: &mut B) -> Result<Bytes> {
    let mut probe = buf.clone();
    if probe.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient bytes for binary data length".to_string(),
        ));
    }

    let len = usize::from(probe.get_u16());
    if probe.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient bytes for binary data: expected {len}, got {}",
            probe.remaining()
        )));
    }

    let data = probe.copy_to_bytes(len);
    *buf = probe;
    Ok(data)
}

/// Calculates the encoded length of binary data (2 bytes for length + data bytes)
#[must_use]
pub fn binary_len(data: &[u8]) -> usize {
    2 + data.len()
}
