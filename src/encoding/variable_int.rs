//! Variable byte integer ("varint") as defined by MQTT
//!
//! Values use 1-4 bytes, seven data bits per byte, least significant group first,
//! with the continuation bit in the MSB:
//! - 0-127: 1 byte
//! - 128-16,383: 2 bytes
//! - 16,384-2,097,151: 3 bytes
//! - 2,097,152-268,435,455: 4 bytes

use crate::constants::limits::MAX_VARIABLE_INT_BYTES;
use crate::constants::masks::{CONTINUATION_BIT, VARIABLE_BYTE_VALUE};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};
use std::fmt;

/// Maximum value that can be encoded as a variable byte integer (268,435,455)
pub const VARIABLE_INT_MAX: u32 = 268_435_455;

/// A value known to fit in a variable byte integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableInt {
    value: u32,
}

impl VariableInt {
    /// Creates a new `VariableInt` from a u32 value
    ///
    /// # Errors
    ///
    /// Returns `MqttError::ProtocolError` if the value exceeds the maximum
    pub fn new(value: u32) -> Result<Self> {
        if value > VARIABLE_INT_MAX {
            return Err(MqttError::ProtocolError(format!(
                "Variable integer value {value} exceeds maximum {VARIABLE_INT_MAX}"
            )));
        }
        Ok(Self { value })
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Returns the number of bytes needed to encode this value
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        match self.value {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }

    /// Appends exactly `encoded_size()` bytes to `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let mut val = self.value;
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let mut byte = (val & u32::from(VARIABLE_BYTE_VALUE)) as u8;
            val >>= 7;
            if val > 0 {
                byte |= CONTINUATION_BIT;
            }
            buf.put_u8(byte);
            if val == 0 {
                break;
            }
        }
    }

    /// Decodes a variable integer, leaving `buf` untouched on failure
    ///
    /// # Errors
    ///
    /// Returns `MqttError::MalformedPacket` if:
    /// - The buffer ends before the last byte of the integer
    /// - The fourth byte still has the continuation bit set
    pub fn decode<B: Buf + Clone>(buf: &mut B) -> Result<Self> {
        let mut probe = buf.clone();
        let mut value = 0u32;

        for index in 0..MAX_VARIABLE_INT_BYTES {
            if !probe.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "Insufficient bytes for variable integer".to_string(),
                ));
            }

            let byte = probe.get_u8();
            value |= u32::from(byte & VARIABLE_BYTE_VALUE) << (7 * index);

            if byte & CONTINUATION_BIT == 0 {
                *buf = probe;
                return Ok(Self { value });
            }
        }

        Err(MqttError::MalformedPacket(
            "Variable integer exceeds 4 bytes".to_string(),
        ))
    }
}

impl fmt::Display for VariableInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<VariableInt> for u32 {
    fn from(v: VariableInt) -> Self {
        v.value
    }
}

impl TryFrom<u32> for VariableInt {
    type Error = MqttError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<usize> for VariableInt {
    type Error = MqttError;

    fn try_from(value: usize) -> Result<Self> {
        let value = u32::try_from(value).map_err(|_| {
            MqttError::ProtocolError("Value too large for variable integer".to_string())
        })?;
        Self::new(value)
    }
}

/// Encodes `value` as a variable byte integer
///
/// # Errors
///
/// Rejects values above [`VARIABLE_INT_MAX`] instead of truncating them
pub fn encode_variable_int<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    VariableInt::new(value)?.encode(buf);
    Ok(())
}

/// Decodes a variable byte integer
///
/// # Errors
///
/// See [`VariableInt::decode`]
pub fn decode_variable_int<B: Buf + Clone>(buf: &mut B) -> Result<u32> {
    VariableInt::decode(buf).map(u32::from)
}

/// Number of bytes the encoding of `value` takes; values above the maximum count as 4
#[must_use]
pub fn variable_int_len(value: u32) -> usize {
    VariableInt {
        value: value.min(VARIABLE_INT_MAX),
    }
    .encoded_size()
}

/// Same as [`variable_int_len`] for lengths computed as `usize`
#[must_use]
pub fn encoded_variable_int_len(value: usize) -> usize {
    variable_int_len(u32::try_from(value).unwrap_or(u32::MAX))
}
