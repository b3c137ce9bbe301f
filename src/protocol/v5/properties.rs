use crate::encoding::{
    binary_len, decode_binary, decode_string, decode_u16, decode_u32, decode_u8,
    decode_variable_int, decode_varint_scoped, encode_binary, encode_string, encode_variable_int,
    string_len, variable_int_len,
};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, Bytes};
use std::collections::HashMap;

/// MQTT v5.0 Property Identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyId {
    // Byte properties
    PayloadFormatIndicator = 0x01,
    RequestProblemInformation = 0x17,
    RequestResponseInformation = 0x19,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2A,

    // Two Byte Integer properties
    ServerKeepAlive = 0x13,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,

    // Four Byte Integer properties
    MessageExpiryInterval = 0x02,
    SessionExpiryInterval = 0x11,
    WillDelayInterval = 0x18,
    MaximumPacketSize = 0x27,

    // Variable Byte Integer properties
    SubscriptionIdentifier = 0x0B,

    // UTF-8 Encoded String properties
    ContentType = 0x03,
    ResponseTopic = 0x08,
    AssignedClientIdentifier = 0x12,
    AuthenticationMethod = 0x15,
    ResponseInformation = 0x1A,
    ServerReference = 0x1C,
    ReasonString = 0x1F,

    // Binary Data properties
    CorrelationData = 0x09,
    AuthenticationData = 0x16,

    // UTF-8 String Pair properties
    UserProperty = 0x26,
}

impl PropertyId {
    /// Converts a wire identifier to a `PropertyId`
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::PayloadFormatIndicator),
            0x02 => Some(Self::MessageExpiryInterval),
            0x03 => Some(Self::ContentType),
            0x08 => Some(Self::ResponseTopic),
            0x09 => Some(Self::CorrelationData),
            0x0B => Some(Self::SubscriptionIdentifier),
            0x11 => Some(Self::SessionExpiryInterval),
            0x12 => Some(Self::AssignedClientIdentifier),
            0x13 => Some(Self::ServerKeepAlive),
            0x15 => Some(Self::AuthenticationMethod),
            0x16 => Some(Self::AuthenticationData),
            0x17 => Some(Self::RequestProblemInformation),
            0x18 => Some(Self::WillDelayInterval),
            0x19 => Some(Self::RequestResponseInformation),
            0x1A => Some(Self::ResponseInformation),
            0x1C => Some(Self::ServerReference),
            0x1F => Some(Self::ReasonString),
            0x21 => Some(Self::ReceiveMaximum),
            0x22 => Some(Self::TopicAliasMaximum),
            0x23 => Some(Self::TopicAlias),
            0x24 => Some(Self::MaximumQoS),
            0x25 => Some(Self::RetainAvailable),
            0x26 => Some(Self::UserProperty),
            0x27 => Some(Self::MaximumPacketSize),
            0x28 => Some(Self::WildcardSubscriptionAvailable),
            0x29 => Some(Self::SubscriptionIdentifierAvailable),
            0x2A => Some(Self::SharedSubscriptionAvailable),
            _ => None,
        }
    }

    /// Checks if this property can appear multiple times in a packet
    #[must_use]
    pub fn allows_multiple(&self) -> bool {
        matches!(self, Self::UserProperty | Self::SubscriptionIdentifier)
    }

    /// Gets the expected value type for this property
    #[must_use]
    pub fn value_type(&self) -> PropertyValueType {
        match self {
            Self::PayloadFormatIndicator
            | Self::RequestProblemInformation
            | Self::RequestResponseInformation
            | Self::MaximumQoS
            | Self::RetainAvailable
            | Self::WildcardSubscriptionAvailable
            | Self::SubscriptionIdentifierAvailable
            | Self::SharedSubscriptionAvailable => PropertyValueType::Byte,

            Self::ServerKeepAlive
            | Self::ReceiveMaximum
            | Self::TopicAliasMaximum
            | Self::TopicAlias => PropertyValueType::TwoByteInteger,

            Self::MessageExpiryInterval
            | Self::SessionExpiryInterval
            | Self::WillDelayInterval
            | Self::MaximumPacketSize => PropertyValueType::FourByteInteger,

            Self::SubscriptionIdentifier => PropertyValueType::VariableByteInteger,

            Self::ContentType
            | Self::ResponseTopic
            | Self::AssignedClientIdentifier
            | Self::AuthenticationMethod
            | Self::ResponseInformation
            | Self::ServerReference
            | Self::ReasonString => PropertyValueType::Utf8String,

            Self::CorrelationData | Self::AuthenticationData => PropertyValueType::BinaryData,

            Self::UserProperty => PropertyValueType::Utf8StringPair,
        }
    }
}

/// Property value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValueType {
    Byte,
    TwoByteInteger,
    FourByteInteger,
    VariableByteInteger,
    BinaryData,
    Utf8String,
    Utf8StringPair,
}

/// Property value storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Byte(u8),
    TwoByteInteger(u16),
    FourByteInteger(u32),
    VariableByteInteger(u32),
    BinaryData(Bytes),
    Utf8String(String),
    Utf8StringPair(String, String),
}

impl PropertyValue {
    #[must_use]
    pub fn value_type(&self) -> PropertyValueType {
        match self {
            Self::Byte(_) => PropertyValueType::Byte,
            Self::TwoByteInteger(_) => PropertyValueType::TwoByteInteger,
            Self::FourByteInteger(_) => PropertyValueType::FourByteInteger,
            Self::VariableByteInteger(_) => PropertyValueType::VariableByteInteger,
            Self::BinaryData(_) => PropertyValueType::BinaryData,
            Self::Utf8String(_) => PropertyValueType::Utf8String,
            Self::Utf8StringPair(_, _) => PropertyValueType::Utf8StringPair,
        }
    }

    /// Number of bytes the value takes on the wire, identifier excluded
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Byte(_) => 1,
            Self::TwoByteInteger(_) => 2,
            Self::FourByteInteger(_) => 4,
            Self::VariableByteInteger(v) => variable_int_len(*v),
            Self::BinaryData(v) => binary_len(v),
            Self::Utf8String(v) => string_len(v),
            Self::Utf8StringPair(k, v) => string_len(k) + string_len(v),
        }
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Self::Byte(v) => buf.put_u8(*v),
            Self::TwoByteInteger(v) => buf.put_u16(*v),
            Self::FourByteInteger(v) => buf.put_u32(*v),
            Self::VariableByteInteger(v) => encode_variable_int(buf, *v)?,
            Self::BinaryData(v) => encode_binary(buf, v)?,
            Self::Utf8String(v) => encode_string(buf, v)?,
            Self::Utf8StringPair(k, v) => {
                encode_string(buf, k)?;
                encode_string(buf, v)?;
            }
        }
        Ok(())
    }

    fn decode<B: Buf + Clone>(value_type: PropertyValueType, buf: &mut B) -> Result<Self> {
        Ok(match value_type {
            PropertyValueType::Byte => Self::Byte(decode_u8(buf)?),
            PropertyValueType::TwoByteInteger => Self::TwoByteInteger(decode_u16(buf)?),
            PropertyValueType::FourByteInteger => Self::FourByteInteger(decode_u32(buf)?),
            PropertyValueType::VariableByteInteger => {
                Self::VariableByteInteger(decode_variable_int(buf)?)
            }
            PropertyValueType::BinaryData => Self::BinaryData(decode_binary(buf)?),
            PropertyValueType::Utf8String => Self::Utf8String(decode_string(buf)?),
            PropertyValueType::Utf8StringPair => {
                let key = decode_string(buf)?;
                let value = decode_string(buf)?;
                Self::Utf8StringPair(key, value)
            }
        })
    }
}

/// The property slots a given control packet may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySet {
    Publish,
    /// PUBACK, PUBREC, PUBREL and PUBCOMP
    Ack,
    Disconnect,
    Connack,
}

const PUBLISH_SLOTS: &[PropertyId] = &[
    PropertyId::PayloadFormatIndicator,
    PropertyId::MessageExpiryInterval,
    PropertyId::ContentType,
    PropertyId::ResponseTopic,
    PropertyId::CorrelationData,
    PropertyId::SubscriptionIdentifier,
    PropertyId::TopicAlias,
    PropertyId::UserProperty,
];

const ACK_SLOTS: &[PropertyId] = &[PropertyId::ReasonString, PropertyId::UserProperty];

const DISCONNECT_SLOTS: &[PropertyId] = &[
    PropertyId::SessionExpiryInterval,
    PropertyId::ReasonString,
    PropertyId::UserProperty,
    PropertyId::ServerReference,
];

const CONNACK_SLOTS: &[PropertyId] = &[
    PropertyId::SessionExpiryInterval,
    PropertyId::ReceiveMaximum,
    PropertyId::MaximumQoS,
    PropertyId::RetainAvailable,
    PropertyId::MaximumPacketSize,
    PropertyId::AssignedClientIdentifier,
    PropertyId::TopicAliasMaximum,
    PropertyId::ReasonString,
    PropertyId::UserProperty,
    PropertyId::WildcardSubscriptionAvailable,
    PropertyId::SubscriptionIdentifierAvailable,
    PropertyId::SharedSubscriptionAvailable,
    PropertyId::ServerKeepAlive,
    PropertyId::ResponseInformation,
    PropertyId::ServerReference,
    PropertyId::AuthenticationMethod,
    PropertyId::AuthenticationData,
];

impl PropertySet {
    #[must_use]
    pub fn slots(self) -> &'static [PropertyId] {
        match self {
            Self::Publish => PUBLISH_SLOTS,
            Self::Ack => ACK_SLOTS,
            Self::Disconnect => DISCONNECT_SLOTS,
            Self::Connack => CONNACK_SLOTS,
        }
    }

    #[must_use]
    pub fn allows(self, id: PropertyId) -> bool {
        self.slots().contains(&id)
    }
}

/// Container for MQTT v5.0 properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    properties: HashMap<PropertyId, Vec<PropertyValue>>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self {
            properties: HashMap::new(),
        }
    }

    /// Adds a property value
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The value type doesn't match the property's expected type
    /// - The property doesn't allow multiple values and already exists
    pub fn add(&mut self, id: PropertyId, value: PropertyValue) -> Result<()> {
        if value.value_type() != id.value_type() {
            return Err(MqttError::ProtocolError(format!(
                "Property {:?} expects type {:?}, got {:?}",
                id,
                id.value_type(),
                value.value_type()
            )));
        }

        if !id.allows_multiple() && self.properties.contains_key(&id) {
            return Err(MqttError::DuplicatePropertyId(id as u8));
        }

        self.properties.entry(id).or_default().push(value);
        Ok(())
    }

    /// Gets a single property value
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&id).and_then(|v| v.first())
    }

    /// Gets all values for a property (for properties that allow multiple values)
    #[must_use]
    pub fn get_all(&self, id: PropertyId) -> &[PropertyValue] {
        self.properties.get(&id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.properties.contains_key(&id)
    }

    /// Returns the number of properties (counting multi-value properties as one)
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterates over all properties in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyValue)> + '_ {
        let mut ids: Vec<_> = self.properties.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().flat_map(move |id| {
            self.properties
                .get(&id)
                .into_iter()
                .flatten()
                .map(move |value| (id, value))
        })
    }

    #[must_use]
    pub fn get_byte(&self, id: PropertyId) -> Option<u8> {
        match self.get(id)? {
            PropertyValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_u16(&self, id: PropertyId) -> Option<u16> {
        match self.get(id)? {
            PropertyValue::TwoByteInteger(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_u32(&self, id: PropertyId) -> Option<u32> {
        match self.get(id)? {
            PropertyValue::FourByteInteger(v) | PropertyValue::VariableByteInteger(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_string(&self, id: PropertyId) -> Option<&str> {
        match self.get(id)? {
            PropertyValue::Utf8String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_binary(&self, id: PropertyId) -> Option<&Bytes> {
        match self.get(id)? {
            PropertyValue::BinaryData(v) => Some(v),
            _ => None,
        }
    }

    /// All user property pairs in wire order
    pub fn user_properties(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.get_all(PropertyId::UserProperty)
            .iter()
            .filter_map(|value| match value {
                PropertyValue::Utf8StringPair(k, v) => Some((k.as_str(), v.as_str())),
                _ => None,
            })
    }

    /// Encodes the varint length prefix followed by every property
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be encoded (oversized string, oversized varint)
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let len = u32::try_from(self.body_len()).map_err(|_| MqttError::PacketTooLarge {
            size: self.body_len(),
            max: crate::encoding::VARIABLE_INT_MAX as usize,
        })?;
        encode_variable_int(buf, len)?;

        for (id, value) in self.iter() {
            encode_variable_int(buf, u32::from(id as u8))?;
            value.encode(buf)?;
        }
        Ok(())
    }

    /// Decodes a varint-prefixed property list allowed in `set`
    ///
    /// Slots not present on the wire stay empty. An empty input is an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The declared length exceeds the input or is not consumed exactly
    /// - An identifier is unknown or not a slot of `set`
    /// - A value fails to decode
    /// - A single-valued property appears twice
    pub fn decode<B: Buf + Clone>(buf: &mut B, set: PropertySet) -> Result<Self> {
        if !buf.has_remaining() {
            return Ok(Self::new());
        }

        decode_varint_scoped(buf, |scope| {
            let mut properties = Self::new();
            while scope.has_remaining() {
                let id_val = decode_variable_int(scope)?;
                let id_byte =
                    u8::try_from(id_val).map_err(|_| MqttError::InvalidPropertyId(0xFF))?;
                let id = PropertyId::from_u8(id_byte)
                    .filter(|id| set.allows(*id))
                    .ok_or(MqttError::InvalidPropertyId(id_byte))?;

                let value = PropertyValue::decode(id.value_type(), scope)?;
                tracing::trace!(property = ?id, "Decoded property");
                properties.add(id, value)?;
            }
            Ok(properties)
        })
    }

    /// Encoded length including the varint length prefix
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let body = self.body_len();
        crate::encoding::encoded_variable_int_len(body) + body
    }

    fn body_len(&self) -> usize {
        self.properties
            .iter()
            .flat_map(|(id, values)| values.iter().map(move |v| (*id, v)))
            .map(|(id, value)| variable_int_len(u32::from(id as u8)) + value.encoded_len())
            .sum()
    }

    pub fn set_reason_string(&mut self, reason: String) {
        self.properties.insert(
            PropertyId::ReasonString,
            vec![PropertyValue::Utf8String(reason)],
        );
    }

    /// Adds a user property (can be called multiple times)
    pub fn add_user_property(&mut self, key: String, value: String) {
        self.properties
            .entry(PropertyId::UserProperty)
            .or_default()
            .push(PropertyValue::Utf8StringPair(key, value));
    }
}
