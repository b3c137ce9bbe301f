//! PUBACK, PUBREC, PUBREL and PUBCOMP
//!
//! The four acknowledgments share one body layout: a packet identifier, then an
//! optional reason code, then an optional property list. Only the packet type, the
//! fixed header flags and the table of legal reason codes differ.

use crate::error::{MqttError, Result};
use crate::packet::{AckPacketHeader, FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertySet};
use crate::protocol::v5::reason_codes::{to_reason_code, ReasonCategory, ReasonCode};
use crate::types::AckProperties;
use bebytes::BeBytes;
use bytes::{Buf, BufMut, Bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPacket {
    packet_type: PacketType,
    pub packet_id: u16,
    pub reason_code: ReasonCode,
    pub properties: AckProperties,
}

impl AckPacket {
    /// Creates a successful acknowledgment of the given type
    ///
    /// # Errors
    ///
    /// Returns `MqttError::InvalidPacketType` unless `packet_type` is one of the four
    /// publish acknowledgments.
    pub fn new(packet_type: PacketType, packet_id: u16) -> Result<Self> {
        if !packet_type.is_publish_ack() {
            return Err(MqttError::InvalidPacketType(u8::from(packet_type)));
        }
        Ok(Self {
            packet_type,
            packet_id,
            reason_code: ReasonCode::SUCCESS,
            properties: AckProperties::default(),
        })
    }

    fn of(packet_type: PacketType, packet_id: u16) -> Self {
        Self {
            packet_type,
            packet_id,
            reason_code: ReasonCode::SUCCESS,
            properties: AckProperties::default(),
        }
    }

    #[must_use]
    pub fn puback(packet_id: u16) -> Self {
        Self::of(PacketType::PubAck, packet_id)
    }

    #[must_use]
    pub fn pubrec(packet_id: u16) -> Self {
        Self::of(PacketType::PubRec, packet_id)
    }

    #[must_use]
    pub fn pubrel(packet_id: u16) -> Self {
        Self::of(PacketType::PubRel, packet_id)
    }

    #[must_use]
    pub fn pubcomp(packet_id: u16) -> Self {
        Self::of(PacketType::PubComp, packet_id)
    }

    #[must_use]
    pub fn with_reason_code(mut self, reason_code: ReasonCode) -> Self {
        self.reason_code = reason_code;
        self
    }

    #[must_use]
    pub fn with_reason_string(mut self, reason: impl Into<String>) -> Self {
        self.properties.reason_string = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .user_properties
            .push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn kind(&self) -> PacketType {
        self.packet_type
    }

    /// Reason code table this acknowledgment is validated against
    #[must_use]
    pub fn category(&self) -> ReasonCategory {
        category_of(self.packet_type)
    }

    /// Decodes an acknowledgment body (the bytes after the fixed header)
    ///
    /// A reason byte outside the table for `packet_type` is reported as
    /// `MqttError::InvalidReasonCode`; every other failure is a decode error.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is truncated, has trailing bytes, carries an illegal
    /// reason code or a malformed property list.
    pub fn decode_ack(packet_type: PacketType, body: &mut Bytes) -> Result<Self> {
        if !packet_type.is_publish_ack() {
            return Err(MqttError::InvalidPacketType(u8::from(packet_type)));
        }

        let (packet_id, reason_byte) = match body.remaining() {
            0 | 1 => {
                return Err(MqttError::MalformedPacket(format!(
                    "{packet_type:?} missing packet identifier"
                )))
            }
            2 => (body.get_u16(), None),
            _ => {
                let (header, consumed) = AckPacketHeader::try_from_be_bytes(body.chunk())?;
                body.advance(consumed);
                (header.packet_id, Some(header.reason_code))
            }
        };

        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(format!(
                "{packet_type:?} packet identifier must be non-zero"
            )));
        }

        let reason_code = match reason_byte {
            None => ReasonCode::SUCCESS,
            Some(byte) => to_reason_code(category_of(packet_type), byte)
                .ok_or(MqttError::InvalidReasonCode(byte))?,
        };

        let properties = Properties::decode(body, PropertySet::Ack)?;
        if body.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{} trailing bytes after {packet_type:?} properties",
                body.remaining()
            )));
        }

        tracing::trace!(
            packet_type = ?packet_type,
            packet_id,
            reason_code = %reason_code,
            "Decoded acknowledgment"
        );

        Ok(Self {
            packet_type,
            packet_id,
            reason_code,
            properties: AckProperties::from(properties),
        })
    }

    fn writes_reason_code(&self) -> bool {
        self.reason_code.value() != ReasonCode::SUCCESS.value() || !self.properties.is_empty()
    }
}

fn category_of(packet_type: PacketType) -> ReasonCategory {
    match packet_type {
        PacketType::PubAck => ReasonCategory::Puback,
        PacketType::PubRec => ReasonCategory::Pubrec,
        PacketType::PubRel => ReasonCategory::Pubrel,
        PacketType::PubComp => ReasonCategory::Pubcomp,
        _ => ReasonCategory::None,
    }
}

impl MqttPacket for AckPacket {
    fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    fn flags(&self) -> u8 {
        if self.packet_type == PacketType::PubRel {
            0x02
        } else {
            0
        }
    }

    fn body_len(&self) -> usize {
        if !self.writes_reason_code() {
            return 2;
        }
        if self.properties.is_empty() {
            3
        } else {
            3 + Properties::from(&self.properties).encoded_len()
        }
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if !self.writes_reason_code() {
            buf.put_u16(self.packet_id);
            return Ok(());
        }

        buf.put_slice(&AckPacketHeader::create(self.packet_id, self.reason_code).to_be_bytes());
        if !self.properties.is_empty() {
            Properties::from(&self.properties).encode(buf)?;
        }
        Ok(())
    }

    fn decode_body(buf: &mut Bytes, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_ack(fixed_header.packet_type, buf)
    }
}
