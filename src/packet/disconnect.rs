use crate::encoding::decode_u8;
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertySet};
use crate::protocol::v5::reason_codes::{to_reason_code, ReasonCategory, ReasonCode};
use crate::types::DisconnectProperties;
use bytes::{Buf, BufMut, Bytes};

/// MQTT DISCONNECT packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: DisconnectProperties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: DisconnectProperties::default(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: DisconnectProperties) -> Self {
        self.properties = properties;
        self
    }
}

impl Default for DisconnectPacket {
    fn default() -> Self {
        Self::new(ReasonCode::NORMAL_DISCONNECTION)
    }
}

impl MqttPacket for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn body_len(&self) -> usize {
        1 + Properties::from(&self.properties).encoded_len()
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(self.reason_code.value());
        Properties::from(&self.properties).encode(buf)
    }

    fn decode_body(buf: &mut Bytes, _fixed_header: &FixedHeader) -> Result<Self> {
        // remaining length 0 means normal disconnection without properties
        if !buf.has_remaining() {
            return Ok(Self::default());
        }

        let byte = decode_u8(buf)?;
        let reason_code = to_reason_code(ReasonCategory::Disconnect, byte)
            .ok_or(MqttError::InvalidReasonCode(byte))?;
        let properties = Properties::decode(buf, PropertySet::Disconnect)?;

        Ok(Self {
            reason_code,
            properties: DisconnectProperties::from(properties),
        })
    }
}
