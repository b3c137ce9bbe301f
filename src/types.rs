use crate::constants::defaults;
use crate::protocol::v5::properties::{Properties, PropertyId, PropertyValue};
use crate::protocol::v5::reason_codes::ReasonCode;
use bytes::Bytes;

fn push(properties: &mut Properties, id: PropertyId, value: PropertyValue) {
    if let Err(e) = properties.add(id, value) {
        tracing::warn!(property = ?id, error = %e, "Failed to add property");
    }
}

fn push_user_properties(properties: &mut Properties, pairs: &[(String, String)]) {
    for (key, value) in pairs {
        properties.add_user_property(key.clone(), value.clone());
    }
}

/// Properties an outbound PUBLISH may carry
///
/// `subscription_identifiers` is only meaningful on inbound messages; publishing with a
/// non-empty list is rejected as a malformed packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    /// `Some(true)` declares the payload as UTF-8 text
    pub payload_format_indicator: Option<bool>,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub user_properties: Vec<(String, String)>,
    pub subscription_identifiers: Vec<u32>,
    pub content_type: Option<String>,
}

impl From<&PublishProperties> for Properties {
    fn from(props: &PublishProperties) -> Self {
        let mut properties = Properties::new();

        if let Some(val) = props.payload_format_indicator {
            push(
                &mut properties,
                PropertyId::PayloadFormatIndicator,
                PropertyValue::Byte(u8::from(val)),
            );
        }
        if let Some(val) = props.message_expiry_interval {
            push(
                &mut properties,
                PropertyId::MessageExpiryInterval,
                PropertyValue::FourByteInteger(val),
            );
        }
        if let Some(val) = &props.content_type {
            push(
                &mut properties,
                PropertyId::ContentType,
                PropertyValue::Utf8String(val.clone()),
            );
        }
        if let Some(val) = &props.response_topic {
            push(
                &mut properties,
                PropertyId::ResponseTopic,
                PropertyValue::Utf8String(val.clone()),
            );
        }
        if let Some(val) = &props.correlation_data {
            push(
                &mut properties,
                PropertyId::CorrelationData,
                PropertyValue::BinaryData(val.clone()),
            );
        }
        for id in &props.subscription_identifiers {
            push(
                &mut properties,
                PropertyId::SubscriptionIdentifier,
                PropertyValue::VariableByteInteger(*id),
            );
        }
        if let Some(val) = props.topic_alias {
            push(
                &mut properties,
                PropertyId::TopicAlias,
                PropertyValue::TwoByteInteger(val),
            );
        }
        push_user_properties(&mut properties, &props.user_properties);

        properties
    }
}

impl From<Properties> for PublishProperties {
    fn from(props: Properties) -> Self {
        let mut result = Self::default();

        for (id, value) in props.iter() {
            match (id, value) {
                (PropertyId::PayloadFormatIndicator, PropertyValue::Byte(v)) => {
                    result.payload_format_indicator = Some(v != &0);
                }
                (PropertyId::MessageExpiryInterval, PropertyValue::FourByteInteger(v)) => {
                    result.message_expiry_interval = Some(*v);
                }
                (PropertyId::ContentType, PropertyValue::Utf8String(v)) => {
                    result.content_type = Some(v.clone());
                }
                (PropertyId::ResponseTopic, PropertyValue::Utf8String(v)) => {
                    result.response_topic = Some(v.clone());
                }
                (PropertyId::CorrelationData, PropertyValue::BinaryData(v)) => {
                    result.correlation_data = Some(v.clone());
                }
                (PropertyId::SubscriptionIdentifier, PropertyValue::VariableByteInteger(v)) => {
                    result.subscription_identifiers.push(*v);
                }
                (PropertyId::TopicAlias, PropertyValue::TwoByteInteger(v)) => {
                    result.topic_alias = Some(*v);
                }
                (PropertyId::UserProperty, PropertyValue::Utf8StringPair(k, v)) => {
                    result.user_properties.push((k.clone(), v.clone()));
                }
                _ => {}
            }
        }

        result
    }
}

/// Properties of PUBACK, PUBREC, PUBREL and PUBCOMP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckProperties {
    pub reason_string: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl AckProperties {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reason_string.is_none() && self.user_properties.is_empty()
    }
}

impl From<&AckProperties> for Properties {
    fn from(props: &AckProperties) -> Self {
        let mut properties = Properties::new();
        if let Some(reason) = &props.reason_string {
            properties.set_reason_string(reason.clone());
        }
        push_user_properties(&mut properties, &props.user_properties);
        properties
    }
}

impl From<Properties> for AckProperties {
    fn from(props: Properties) -> Self {
        Self {
            reason_string: props
                .get_string(PropertyId::ReasonString)
                .map(ToString::to_string),
            user_properties: props
                .user_properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<(String, String)>,
    pub server_reference: Option<String>,
}

impl DisconnectProperties {
    #[must_use]
    pub fn with_reason_string(reason: impl Into<String>) -> Self {
        Self {
            reason_string: Some(reason.into()),
            ..Self::default()
        }
    }
}

impl From<&DisconnectProperties> for Properties {
    fn from(props: &DisconnectProperties) -> Self {
        let mut properties = Properties::new();
        if let Some(val) = props.session_expiry_interval {
            push(
                &mut properties,
                PropertyId::SessionExpiryInterval,
                PropertyValue::FourByteInteger(val),
            );
        }
        if let Some(reason) = &props.reason_string {
            properties.set_reason_string(reason.clone());
        }
        if let Some(val) = &props.server_reference {
            push(
                &mut properties,
                PropertyId::ServerReference,
                PropertyValue::Utf8String(val.clone()),
            );
        }
        push_user_properties(&mut properties, &props.user_properties);
        properties
    }
}

impl From<Properties> for DisconnectProperties {
    fn from(props: Properties) -> Self {
        Self {
            session_expiry_interval: props.get_u32(PropertyId::SessionExpiryInterval),
            reason_string: props
                .get_string(PropertyId::ReasonString)
                .map(ToString::to_string),
            user_properties: props
                .user_properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            server_reference: props
                .get_string(PropertyId::ServerReference)
                .map(ToString::to_string),
        }
    }
}

/// Limits negotiated with the server in CONNACK
///
/// Every slot is optional on the wire. The accessor methods apply the protocol defaults
/// for absent slots, so a `ConnackProperties::default()` describes a server that imposes
/// no limits beyond the protocol's own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnackProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_qos: Option<u8>,
    pub retain_available: Option<bool>,
    pub maximum_packet_size: Option<u32>,
    pub assigned_client_identifier: Option<String>,
    pub topic_alias_maximum: Option<u16>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<(String, String)>,
    pub wildcard_subscription_available: Option<bool>,
    pub subscription_identifier_available: Option<bool>,
    pub shared_subscription_available: Option<bool>,
    pub server_keep_alive: Option<u16>,
    pub response_information: Option<String>,
    pub server_reference: Option<String>,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Bytes>,
}

impl ConnackProperties {
    /// Outstanding QoS 1 and 2 publishes the server accepts; 65535 means unlimited
    #[must_use]
    pub fn receive_maximum(&self) -> u16 {
        self.receive_maximum.unwrap_or(defaults::RECEIVE_MAXIMUM)
    }

    #[must_use]
    pub fn maximum_qos(&self) -> u8 {
        self.maximum_qos.unwrap_or(defaults::MAXIMUM_QOS)
    }

    #[must_use]
    pub fn retain_available(&self) -> bool {
        self.retain_available.unwrap_or(true)
    }

    #[must_use]
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
            .unwrap_or(defaults::MAXIMUM_PACKET_SIZE)
    }

    #[must_use]
    pub fn topic_alias_maximum(&self) -> u16 {
        self.topic_alias_maximum
            .unwrap_or(defaults::TOPIC_ALIAS_MAXIMUM)
    }

    #[must_use]
    pub fn with_receive_maximum(mut self, value: u16) -> Self {
        self.receive_maximum = Some(value);
        self
    }

    #[must_use]
    pub fn with_maximum_qos(mut self, value: u8) -> Self {
        self.maximum_qos = Some(value);
        self
    }

    #[must_use]
    pub fn with_retain_available(mut self, value: bool) -> Self {
        self.retain_available = Some(value);
        self
    }

    #[must_use]
    pub fn with_maximum_packet_size(mut self, value: u32) -> Self {
        self.maximum_packet_size = Some(value);
        self
    }

    #[must_use]
    pub fn with_topic_alias_maximum(mut self, value: u16) -> Self {
        self.topic_alias_maximum = Some(value);
        self
    }
}

impl From<Properties> for ConnackProperties {
    fn from(props: Properties) -> Self {
        let flag = |id| props.get_byte(id).map(|v| v != 0);
        let string = |id| props.get_string(id).map(ToString::to_string);

        Self {
            session_expiry_interval: props.get_u32(PropertyId::SessionExpiryInterval),
            receive_maximum: props.get_u16(PropertyId::ReceiveMaximum),
            maximum_qos: props.get_byte(PropertyId::MaximumQoS),
            retain_available: flag(PropertyId::RetainAvailable),
            maximum_packet_size: props.get_u32(PropertyId::MaximumPacketSize),
            assigned_client_identifier: string(PropertyId::AssignedClientIdentifier),
            topic_alias_maximum: props.get_u16(PropertyId::TopicAliasMaximum),
            reason_string: string(PropertyId::ReasonString),
            user_properties: props
                .user_properties()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            wildcard_subscription_available: flag(PropertyId::WildcardSubscriptionAvailable),
            subscription_identifier_available: flag(PropertyId::SubscriptionIdentifierAvailable),
            shared_subscription_available: flag(PropertyId::SharedSubscriptionAvailable),
            server_keep_alive: props.get_u16(PropertyId::ServerKeepAlive),
            response_information: string(PropertyId::ResponseInformation),
            server_reference: string(PropertyId::ServerReference),
            authentication_method: string(PropertyId::AuthenticationMethod),
            authentication_data: props.get_binary(PropertyId::AuthenticationData).cloned(),
        }
    }
}

/// Per-message options of a publish
///
/// The QoS is chosen by the publish call itself.
///
/// # Examples
///
/// ```
/// use mqtt5_publish::PublishOptions;
///
/// let options = PublishOptions::default()
///     .with_retain(true)
///     .with_message_expiry_interval(3600)
///     .with_user_property("origin", "sensor-7");
/// assert!(options.retain);
/// assert_eq!(options.properties.message_expiry_interval, Some(3600));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub retain: bool,
    pub properties: PublishProperties,
}

impl PublishOptions {
    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_payload_format_indicator(mut self, utf8: bool) -> Self {
        self.properties.payload_format_indicator = Some(utf8);
        self
    }

    #[must_use]
    pub fn with_message_expiry_interval(mut self, seconds: u32) -> Self {
        self.properties.message_expiry_interval = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_topic_alias(mut self, alias: u16) -> Self {
        self.properties.topic_alias = Some(alias);
        self
    }

    #[must_use]
    pub fn with_response_topic(mut self, topic: impl Into<String>) -> Self {
        self.properties.response_topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_correlation_data(mut self, data: impl Into<Bytes>) -> Self {
        self.properties.correlation_data = Some(data.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.properties.content_type = Some(content_type.into());
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
    pub fn with_subscription_identifier(mut self, id: u32) -> Self {
        self.properties.subscription_identifiers.push(id);
        self
    }
}

/// Outcome of a QoS 1 or QoS 2 publish
///
/// A non-success `reason_code` is the server rejecting the message; the exchange itself
/// still completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishAck {
    pub reason_code: ReasonCode,
    pub properties: AckProperties,
}

impl PublishAck {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.reason_code.is_error()
    }
}
