pub mod ack;
pub mod disconnect;
pub mod publish;

use crate::encoding::{
    decode_scoped, decode_variable_int, encode_variable_int, encoded_variable_int_len,
    VARIABLE_INT_MAX,
};
use crate::error::{MqttError, Result};
use bebytes::BeBytes;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use ack::AckPacket;
pub use disconnect::DisconnectPacket;
pub use publish::PublishPacket;

/// Packet identifier and reason code at the start of every acknowledgment body
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
pub struct AckPacketHeader {
    /// Packet identifier (big-endian u16)
    #[bebytes(big_endian)]
    pub packet_id: u16,
    /// Reason code (single byte)
    pub reason_code: u8,
}

impl AckPacketHeader {
    #[must_use]
    pub fn create(
        packet_id: u16,
        reason_code: crate::protocol::v5::reason_codes::ReasonCode,
    ) -> Self {
        Self {
            packet_id,
            reason_code: u8::from(reason_code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BeBytes)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl PacketType {
    /// Converts a u8 to `PacketType`
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        // Use the TryFrom implementation generated by BeBytes
        Self::try_from(value).ok()
    }

    /// Whether this is one of the four acknowledgments of the publish exchange
    #[must_use]
    pub fn is_publish_ack(self) -> bool {
        matches!(
            self,
            Self::PubAck | Self::PubRec | Self::PubRel | Self::PubComp
        )
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

/// MQTT packet fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    /// Encodes the fixed header
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining length is too large
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let byte1 =
            (u8::from(self.packet_type) << 4) | (self.flags & crate::constants::masks::FLAGS);
        buf.put_u8(byte1);
        encode_variable_int(buf, self.remaining_length)
    }

    /// Decodes a fixed header, leaving `buf` untouched on failure
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Insufficient bytes in buffer
    /// - Invalid packet type
    /// - Invalid remaining length
    pub fn decode<B: Buf + Clone>(buf: &mut B) -> Result<Self> {
        let mut probe = buf.clone();
        if !probe.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "No data for fixed header".to_string(),
            ));
        }

        let byte1 = probe.get_u8();
        let packet_type_val = (byte1 & crate::constants::masks::PACKET_TYPE) >> 4;
        let flags = byte1 & crate::constants::masks::FLAGS;

        let packet_type = PacketType::from_u8(packet_type_val)
            .ok_or(MqttError::InvalidPacketType(packet_type_val))?;
        let remaining_length = decode_variable_int(&mut probe)?;

        *buf = probe;
        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }

    /// Validates the flags for the packet type
    #[must_use]
    pub fn validate_flags(&self) -> bool {
        match self.packet_type {
            PacketType::Publish => crate::flags::PublishFlags::extract_qos(self.flags) < 3,
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => {
                self.flags == 0x02
            }
            _ => self.flags == 0,
        }
    }

    /// Returns the encoded length of the fixed header
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + crate::encoding::variable_int_len(self.remaining_length)
    }
}

/// Trait for MQTT packets
///
/// Implementors report the exact size of their body up front, so a whole packet is
/// written into a single buffer allocated once with the final length.
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    /// Returns the fixed header flags
    fn flags(&self) -> u8 {
        0
    }

    /// Exact number of bytes `encode_body` appends
    fn body_len(&self) -> usize;

    /// Encodes the packet body (without fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented on the wire
    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    /// Decodes the packet body (without fixed header)
    ///
    /// `buf` holds exactly the remaining length announced by `fixed_header`.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails
    fn decode_body(buf: &mut Bytes, fixed_header: &FixedHeader) -> Result<Self>;

    /// Size of the complete packet, fixed header included
    fn encoded_len(&self) -> usize {
        let body = self.body_len();
        1 + encoded_variable_int_len(body) + body
    }

    /// Encodes the complete packet (with fixed header)
    ///
    /// # Errors
    ///
    /// Returns an error if the body exceeds the largest representable remaining length
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let body_len = self.body_len();
        let remaining_length = u32::try_from(body_len)
            .ok()
            .filter(|len| *len <= VARIABLE_INT_MAX)
            .ok_or(MqttError::PacketTooLarge {
                size: body_len,
                max: VARIABLE_INT_MAX as usize,
            })?;

        FixedHeader::new(self.packet_type(), self.flags(), remaining_length).encode(buf)?;
        self.encode_body(buf)
    }

    /// Encodes the complete packet into a freshly allocated buffer
    ///
    /// # Errors
    ///
    /// Same as [`MqttPacket::encode`]
    fn to_bytes(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// Decodes one complete packet of type `P` from the front of `buf`
///
/// # Errors
///
/// Returns an error if the fixed header is malformed, names a different packet type,
/// carries invalid flags, or the body does not decode to exactly the remaining length.
pub fn decode_packet<P: MqttPacket, B: Buf + Clone>(
    buf: &mut B,
    expected: PacketType,
) -> Result<P> {
    let mut probe = buf.clone();
    let fixed_header = FixedHeader::decode(&mut probe)?;
    if fixed_header.packet_type != expected {
        return Err(MqttError::InvalidPacketType(u8::from(
            fixed_header.packet_type,
        )));
    }
    if !fixed_header.validate_flags() {
        return Err(MqttError::MalformedPacket(format!(
            "Invalid flags 0x{:02X} for {:?}",
            fixed_header.flags, fixed_header.packet_type
        )));
    }

    let packet = decode_scoped(&mut probe, fixed_header.remaining_length as usize, |body| {
        P::decode_body(body, &fixed_header)
    })?;
    *buf = probe;
    Ok(packet)
}
