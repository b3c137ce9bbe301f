use crate::encoding::{decode_string, decode_u16, encode_string, string_len};
use crate::error::{MqttError, Result};
use crate::flags::PublishFlags;
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::{Properties, PropertySet};
use crate::types::PublishProperties;
use crate::QoS;
use bytes::{Buf, BufMut, Bytes};

/// MQTT PUBLISH packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    /// Present iff `qos` is above at-most-once
    pub packet_id: Option<u16>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub properties: Properties,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_packet_id(mut self, id: u16) -> Self {
        self.packet_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: &PublishProperties) -> Self {
        self.properties = Properties::from(properties);
        self
    }

    /// Typed view of the carried properties
    #[must_use]
    pub fn publish_properties(&self) -> PublishProperties {
        PublishProperties::from(self.properties.clone())
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let mut flags = PublishFlags::with_qos(0, self.qos as u8);
        if self.dup {
            flags |= PublishFlags::Dup as u8;
        }
        if self.retain {
            flags |= PublishFlags::Retain as u8;
        }
        flags
    }

    fn body_len(&self) -> usize {
        let pid_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        string_len(&self.topic_name) + pid_len + self.properties.encoded_len() + self.payload.len()
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic_name)?;

        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                MqttError::ProtocolError("Packet ID required for QoS > 0".to_string())
            })?;
            buf.put_u16(packet_id);
        }

        self.properties.encode(buf)?;
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body(buf: &mut Bytes, fixed_header: &FixedHeader) -> Result<Self> {
        let flags = fixed_header.flags;
        let qos = match PublishFlags::extract_qos(flags) {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            other => {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid QoS {other} in PUBLISH flags"
                )))
            }
        };

        let topic_name = decode_string(buf)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            match decode_u16(buf)? {
                0 => {
                    return Err(MqttError::MalformedPacket(
                        "PUBLISH packet identifier must be non-zero".to_string(),
                    ))
                }
                id => Some(id),
            }
        };

        let properties = Properties::decode(buf, PropertySet::Publish)?;
        let payload = buf.copy_to_bytes(buf.remaining());

        tracing::trace!(
            topic = %topic_name,
            packet_id = ?packet_id,
            qos = ?qos,
            payload_len = payload.len(),
            "Decoded PUBLISH"
        );

        Ok(Self {
            topic_name,
            packet_id,
            payload,
            qos,
            retain: PublishFlags::is_retain(flags),
            dup: PublishFlags::is_dup(flags),
            properties,
        })
    }
}
