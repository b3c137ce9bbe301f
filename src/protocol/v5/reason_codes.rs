//! MQTT v5.0 reason codes and the per-packet validity tables
//!
//! A reason code is a byte plus the category of packet it belongs to. The
//! category only matters for `0x00`, whose meaning differs between packets
//! (success, normal disconnection, granted `QoS` 0), and for validation: a byte
//! that is a registered reason code may still be illegal in a given packet.

use std::fmt;

/// Packet family a reason code was received in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCategory {
    None,
    Connack,
    Puback,
    Pubrec,
    Pubrel,
    Pubcomp,
    Suback,
    Unsuback,
    Auth,
    Disconnect,
}

/// A single-byte outcome indicator
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReasonCode {
    code: u8,
    category: ReasonCategory,
}

impl ReasonCode {
    /// Placeholder for "no reason code received"
    pub const EMPTY: Self = Self::new(0xFF);

    pub const SUCCESS: Self = Self::new(0x00);
    pub const NORMAL_DISCONNECTION: Self = Self::with_category(0x00, ReasonCategory::Disconnect);
    pub const GRANTED_QOS_0: Self = Self::with_category(0x00, ReasonCategory::Suback);
    pub const GRANTED_QOS_1: Self = Self::new(0x01);
    pub const GRANTED_QOS_2: Self = Self::new(0x02);
    pub const DISCONNECT_WITH_WILL_MESSAGE: Self = Self::new(0x04);
    pub const NO_MATCHING_SUBSCRIBERS: Self = Self::new(0x10);
    pub const NO_SUBSCRIPTION_EXISTED: Self = Self::new(0x11);
    pub const CONTINUE_AUTHENTICATION: Self = Self::new(0x18);
    pub const REAUTHENTICATE: Self = Self::new(0x19);

    pub const UNSPECIFIED_ERROR: Self = Self::new(0x80);
    pub const MALFORMED_PACKET: Self = Self::new(0x81);
    pub const PROTOCOL_ERROR: Self = Self::new(0x82);
    pub const IMPLEMENTATION_SPECIFIC_ERROR: Self = Self::new(0x83);
    pub const UNSUPPORTED_PROTOCOL_VERSION: Self = Self::new(0x84);
    pub const CLIENT_IDENTIFIER_NOT_VALID: Self = Self::new(0x85);
    pub const BAD_USERNAME_OR_PASSWORD: Self = Self::new(0x86);
    pub const NOT_AUTHORIZED: Self = Self::new(0x87);
    pub const SERVER_UNAVAILABLE: Self = Self::new(0x88);
    pub const SERVER_BUSY: Self = Self::new(0x89);
    pub const BANNED: Self = Self::new(0x8A);
    pub const SERVER_SHUTTING_DOWN: Self = Self::new(0x8B);
    pub const BAD_AUTHENTICATION_METHOD: Self = Self::new(0x8C);
    pub const KEEP_ALIVE_TIMEOUT: Self = Self::new(0x8D);
    pub const SESSION_TAKEN_OVER: Self = Self::new(0x8E);
    pub const TOPIC_FILTER_INVALID: Self = Self::new(0x8F);
    pub const TOPIC_NAME_INVALID: Self = Self::new(0x90);
    pub const PACKET_IDENTIFIER_IN_USE: Self = Self::new(0x91);
    pub const PACKET_IDENTIFIER_NOT_FOUND: Self = Self::new(0x92);
    pub const RECEIVE_MAXIMUM_EXCEEDED: Self = Self::new(0x93);
    pub const TOPIC_ALIAS_INVALID: Self = Self::new(0x94);
    pub const PACKET_TOO_LARGE: Self = Self::new(0x95);
    pub const MESSAGE_RATE_TOO_HIGH: Self = Self::new(0x96);
    pub const QUOTA_EXCEEDED: Self = Self::new(0x97);
    pub const ADMINISTRATIVE_ACTION: Self = Self::new(0x98);
    pub const PAYLOAD_FORMAT_INVALID: Self = Self::new(0x99);
    pub const RETAIN_NOT_SUPPORTED: Self = Self::new(0x9A);
    pub const QOS_NOT_SUPPORTED: Self = Self::new(0x9B);
    pub const USE_ANOTHER_SERVER: Self = Self::new(0x9C);
    pub const SERVER_MOVED: Self = Self::new(0x9D);
    pub const SHARED_SUBSCRIPTIONS_NOT_SUPPORTED: Self = Self::new(0x9E);
    pub const CONNECTION_RATE_EXCEEDED: Self = Self::new(0x9F);
    pub const MAXIMUM_CONNECT_TIME: Self = Self::new(0xA0);
    pub const SUBSCRIPTION_IDS_NOT_SUPPORTED: Self = Self::new(0xA1);
    pub const WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED: Self = Self::new(0xA2);

    const fn new(code: u8) -> Self {
        Self {
            code,
            category: ReasonCategory::None,
        }
    }

    /// Creates a reason code tagged with the packet family it belongs to
    #[must_use]
    pub const fn with_category(code: u8, category: ReasonCategory) -> Self {
        Self { code, category }
    }

    /// Returns the byte value of the reason code
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.code
    }

    #[must_use]
    pub const fn category(&self) -> ReasonCategory {
        self.category
    }

    /// Any value of 0x80 or greater indicates failure
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 0x80
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// Short identifier of the reason code
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.code {
            0x00 => match self.category {
                ReasonCategory::Suback => "GrantedQoS0",
                ReasonCategory::Disconnect => "NormalDisconnection",
                _ => "Success",
            },
            0x01 => "GrantedQoS1",
            0x02 => "GrantedQoS2",
            0x04 => "DisconnectWithWillMessage",
            0x10 => "NoMatchingSubscribers",
            0x11 => "NoSubscriptionExisted",
            0x18 => "ContinueAuthentication",
            0x19 => "ReAuthenticate",
            0x80 => "UnspecifiedError",
            0x81 => "MalformedPacket",
            0x82 => "ProtocolError",
            0x83 => "ImplementationSpecificError",
            0x84 => "UnsupportedProtocolVersion",
            0x85 => "ClientIdentifierNotValid",
            0x86 => "BadUsernameOrPassword",
            0x87 => "NotAuthorized",
            0x88 => "ServerUnavailable",
            0x89 => "ServerBusy",
            0x8A => "Banned",
            0x8B => "ServerShuttingDown",
            0x8C => "BadAuthenticationMethod",
            0x8D => "KeepAliveTimeout",
            0x8E => "SessionTakenOver",
            0x8F => "TopicFilterInvalid",
            0x90 => "TopicNameInvalid",
            0x91 => "PacketIdentifierInUse",
            0x92 => "PacketIdentifierNotFound",
            0x93 => "ReceiveMaximumExceeded",
            0x94 => "TopicAliasInvalid",
            0x95 => "PacketTooLarge",
            0x96 => "MessageRateTooHigh",
            0x97 => "QuotaExceeded",
            0x98 => "AdministrativeAction",
            0x99 => "PayloadFormatInvalid",
            0x9A => "RetainNotSupported",
            0x9B => "QoSNotSupported",
            0x9C => "UseAnotherServer",
            0x9D => "ServerMoved",
            0x9E => "SharedSubscriptionsNotSupported",
            0x9F => "ConnectionRateExceeded",
            0xA0 => "MaximumConnectTime",
            0xA1 => "SubscriptionIdentifiersNotSupported",
            0xA2 => "WildcardSubscriptionsNotSupported",
            0xFF => "Empty",
            _ => "Unknown",
        }
    }

    /// Describes the meaning of the reason code
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self.code {
            0x00 => match self.category {
                ReasonCategory::Suback => {
                    "The subscription is accepted with maximum QoS sent at 0"
                }
                ReasonCategory::Disconnect => {
                    "Close the connection normally. Do not send the Will Message"
                }
                _ => "The operation completed successfully",
            },
            0x01 => "The subscription is accepted with maximum QoS sent at 1",
            0x02 => "The subscription is accepted with maximum QoS sent at 2",
            0x04 => {
                "The Client wishes to disconnect but requires that the Server also publishes its Will Message"
            }
            0x10 => "The message is accepted but there are no subscribers",
            0x11 => "No matching Topic Filter is being used by the Client",
            0x18 => "Continue the authentication with another step",
            0x19 => "Initiate a re-authentication",
            0x80 => {
                "The Server does not wish to reveal the reason for the failure or none of the other Reason Codes apply"
            }
            0x81 => "Data within the packet could not be correctly parsed",
            0x82 => "Data in the packet does not conform to the MQTT protocol",
            0x83 => "The packet is valid but not accepted by this Server",
            0x84 => "The Server does not support the requested version of the MQTT protocol",
            0x85 => "The Client ID is valid but not allowed by this Server",
            0x86 => "The Server does not accept the User Name or Password provided",
            0x87 => "The request is not authorized",
            0x88 => "The MQTT Server is not available",
            0x89 => "The Server is busy, try again later",
            0x8A => "The Client has been banned by administrative action",
            0x8B => "The Server is shutting down",
            0x8C => "The authentication method is not supported or does not match the one in use",
            0x8D => "No packet has been received for 1.5 times the Keepalive time",
            0x8E => "Another Connection using the same ClientID has connected",
            0x8F => "The Topic Filter is not supported or is not allowed for this Client",
            0x90 => "The Topic Name is correctly formed but not accepted",
            0x91 => "The Packet Identifier is already in use",
            0x92 => "The Packet Identifier is not known",
            0x93 => "More PUBLISH packets were received than the Receive Maximum allows",
            0x94 => "The Topic Alias is invalid",
            0x95 => "The packet exceeded the maximum permissible size",
            0x96 => "The received data rate is too high",
            0x97 => "An implementation or administrative imposed limit has been exceeded",
            0x98 => "The Connection is closed due to an administrative action",
            0x99 => "The Payload does not match the Payload Format Indicator",
            0x9A => "The Server does not support retained messages",
            0x9B => "The Server does not support the requested QoS",
            0x9C => "The Client should temporarily use another server",
            0x9D => "The Client should permanently use another server",
            0x9E => "The Server does not support Shared Subscriptions",
            0x9F => "The connection rate limit has been exceeded",
            0xA0 => "The maximum connection time authorized has been exceeded",
            0xA1 => "The Server does not support Subscription Identifiers",
            0xA2 => "The Server does not support Wildcard Subscriptions",
            0xFF => "No Reason Code. A Client error occurred before the packet was sent",
            _ => "Invalid Reason Code",
        }
    }
}

impl Default for ReasonCode {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<ReasonCode> for u8 {
    fn from(code: ReasonCode) -> Self {
        code.code
    }
}

const ALL_CODES: &[ReasonCode] = &[
    ReasonCode::SUCCESS,
    ReasonCode::GRANTED_QOS_1,
    ReasonCode::GRANTED_QOS_2,
    ReasonCode::DISCONNECT_WITH_WILL_MESSAGE,
    ReasonCode::NO_MATCHING_SUBSCRIBERS,
    ReasonCode::NO_SUBSCRIPTION_EXISTED,
    ReasonCode::CONTINUE_AUTHENTICATION,
    ReasonCode::REAUTHENTICATE,
    ReasonCode::UNSPECIFIED_ERROR,
    ReasonCode::MALFORMED_PACKET,
    ReasonCode::PROTOCOL_ERROR,
    ReasonCode::IMPLEMENTATION_SPECIFIC_ERROR,
    ReasonCode::UNSUPPORTED_PROTOCOL_VERSION,
    ReasonCode::CLIENT_IDENTIFIER_NOT_VALID,
    ReasonCode::BAD_USERNAME_OR_PASSWORD,
    ReasonCode::NOT_AUTHORIZED,
    ReasonCode::SERVER_UNAVAILABLE,
    ReasonCode::SERVER_BUSY,
    ReasonCode::BANNED,
    ReasonCode::SERVER_SHUTTING_DOWN,
    ReasonCode::BAD_AUTHENTICATION_METHOD,
    ReasonCode::KEEP_ALIVE_TIMEOUT,
    ReasonCode::SESSION_TAKEN_OVER,
    ReasonCode::TOPIC_FILTER_INVALID,
    ReasonCode::TOPIC_NAME_INVALID,
    ReasonCode::PACKET_IDENTIFIER_IN_USE,
    ReasonCode::PACKET_IDENTIFIER_NOT_FOUND,
    ReasonCode::RECEIVE_MAXIMUM_EXCEEDED,
    ReasonCode::TOPIC_ALIAS_INVALID,
    ReasonCode::PACKET_TOO_LARGE,
    ReasonCode::MESSAGE_RATE_TOO_HIGH,
    ReasonCode::QUOTA_EXCEEDED,
    ReasonCode::ADMINISTRATIVE_ACTION,
    ReasonCode::PAYLOAD_FORMAT_INVALID,
    ReasonCode::RETAIN_NOT_SUPPORTED,
    ReasonCode::QOS_NOT_SUPPORTED,
    ReasonCode::USE_ANOTHER_SERVER,
    ReasonCode::SERVER_MOVED,
    ReasonCode::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED,
    ReasonCode::CONNECTION_RATE_EXCEEDED,
    ReasonCode::MAXIMUM_CONNECT_TIME,
    ReasonCode::SUBSCRIPTION_IDS_NOT_SUPPORTED,
    ReasonCode::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED,
];

const CONNACK_CODES: &[ReasonCode] = &[
    ReasonCode::SUCCESS,
    ReasonCode::UNSPECIFIED_ERROR,
    ReasonCode::MALFORMED_PACKET,
    ReasonCode::PROTOCOL_ERROR,
    ReasonCode::IMPLEMENTATION_SPECIFIC_ERROR,
    ReasonCode::UNSUPPORTED_PROTOCOL_VERSION,
    ReasonCode::CLIENT_IDENTIFIER_NOT_VALID,
    ReasonCode::BAD_USERNAME_OR_PASSWORD,
    ReasonCode::NOT_AUTHORIZED,
    ReasonCode::SERVER_UNAVAILABLE,
    ReasonCode::SERVER_BUSY,
    ReasonCode::BANNED,
    ReasonCode::BAD_AUTHENTICATION_METHOD,
    ReasonCode::TOPIC_NAME_INVALID,
    ReasonCode::PACKET_TOO_LARGE,
    ReasonCode::QUOTA_EXCEEDED,
    ReasonCode::PAYLOAD_FORMAT_INVALID,
    ReasonCode::RETAIN_NOT_SUPPORTED,
    ReasonCode::QOS_NOT_SUPPORTED,
    ReasonCode::USE_ANOTHER_SERVER,
    ReasonCode::SERVER_MOVED,
    ReasonCode::CONNECTION_RATE_EXCEEDED,
];

const AUTH_CODES: &[ReasonCode] = &[
    ReasonCode::SUCCESS,
    ReasonCode::CONTINUE_AUTHENTICATION,
    ReasonCode::REAUTHENTICATE,
];

const PUBACK_PUBREC_CODES: &[ReasonCode] = &[
    ReasonCode::SUCCESS,
    ReasonCode::NO_MATCHING_SUBSCRIBERS,
    ReasonCode::UNSPECIFIED_ERROR,
    ReasonCode::IMPLEMENTATION_SPECIFIC_ERROR,
    ReasonCode::NOT_AUTHORIZED,
    ReasonCode::TOPIC_NAME_INVALID,
    ReasonCode::PACKET_IDENTIFIER_IN_USE,
    ReasonCode::QUOTA_EXCEEDED,
    ReasonCode::PAYLOAD_FORMAT_INVALID,
];

const PUBREL_PUBCOMP_CODES: &[ReasonCode] = &[
    ReasonCode::SUCCESS,
    ReasonCode::PACKET_IDENTIFIER_NOT_FOUND,
];

const SUBACK_CODES: &[ReasonCode] = &[
    ReasonCode::GRANTED_QOS_0,
    ReasonCode::GRANTED_QOS_1,
    ReasonCode::GRANTED_QOS_2,
    ReasonCode::UNSPECIFIED_ERROR,
    ReasonCode::IMPLEMENTATION_SPECIFIC_ERROR,
    ReasonCode::NOT_AUTHORIZED,
    ReasonCode::TOPIC_FILTER_INVALID,
    ReasonCode::PACKET_IDENTIFIER_IN_USE,
    ReasonCode::QUOTA_EXCEEDED,
    ReasonCode::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED,
    ReasonCode::SUBSCRIPTION_IDS_NOT_SUPPORTED,
    ReasonCode::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED,
];

const UNSUBACK_CODES: &[ReasonCode] = &[
    ReasonCode::SUCCESS,
    ReasonCode::NO_SUBSCRIPTION_EXISTED,
    ReasonCode::UNSPECIFIED_ERROR,
    ReasonCode::IMPLEMENTATION_SPECIFIC_ERROR,
    ReasonCode::NOT_AUTHORIZED,
    ReasonCode::TOPIC_FILTER_INVALID,
    ReasonCode::PACKET_IDENTIFIER_IN_USE,
];

const DISCONNECT_CODES: &[ReasonCode] = &[
    ReasonCode::NORMAL_DISCONNECTION,
    ReasonCode::DISCONNECT_WITH_WILL_MESSAGE,
    ReasonCode::UNSPECIFIED_ERROR,
    ReasonCode::MALFORMED_PACKET,
    ReasonCode::PROTOCOL_ERROR,
    ReasonCode::IMPLEMENTATION_SPECIFIC_ERROR,
    ReasonCode::NOT_AUTHORIZED,
    ReasonCode::SERVER_BUSY,
    ReasonCode::SERVER_SHUTTING_DOWN,
    ReasonCode::KEEP_ALIVE_TIMEOUT,
    ReasonCode::SESSION_TAKEN_OVER,
    ReasonCode::TOPIC_FILTER_INVALID,
    ReasonCode::TOPIC_NAME_INVALID,
    ReasonCode::RECEIVE_MAXIMUM_EXCEEDED,
    ReasonCode::TOPIC_ALIAS_INVALID,
    ReasonCode::PACKET_TOO_LARGE,
    ReasonCode::MESSAGE_RATE_TOO_HIGH,
    ReasonCode::QUOTA_EXCEEDED,
    ReasonCode::ADMINISTRATIVE_ACTION,
    ReasonCode::PAYLOAD_FORMAT_INVALID,
    ReasonCode::RETAIN_NOT_SUPPORTED,
    ReasonCode::QOS_NOT_SUPPORTED,
    ReasonCode::USE_ANOTHER_SERVER,
    ReasonCode::SERVER_MOVED,
    ReasonCode::SHARED_SUBSCRIPTIONS_NOT_SUPPORTED,
    ReasonCode::CONNECTION_RATE_EXCEEDED,
    ReasonCode::MAXIMUM_CONNECT_TIME,
    ReasonCode::SUBSCRIPTION_IDS_NOT_SUPPORTED,
    ReasonCode::WILDCARD_SUBSCRIPTIONS_NOT_SUPPORTED,
];

impl ReasonCategory {
    /// Reason codes a packet of this category may carry, sorted by value
    #[must_use]
    pub fn valid_codes(self) -> &'static [ReasonCode] {
        match self {
            Self::None => ALL_CODES,
            Self::Connack => CONNACK_CODES,
            Self::Auth => AUTH_CODES,
            Self::Puback | Self::Pubrec => PUBACK_PUBREC_CODES,
            Self::Pubrel | Self::Pubcomp => PUBREL_PUBCOMP_CODES,
            Self::Suback => SUBACK_CODES,
            Self::Unsuback => UNSUBACK_CODES,
            Self::Disconnect => DISCONNECT_CODES,
        }
    }
}

/// Looks `code` up in the validity table of `category`
///
/// Returns `None` when the byte is not legal for that packet family, even if it is
/// a registered reason code elsewhere.
#[must_use]
pub fn to_reason_code(category: ReasonCategory, code: u8) -> Option<ReasonCode> {
    let table = category.valid_codes();
    table
        .binary_search_by_key(&code, ReasonCode::value)
        .ok()
        .map(|index| table[index])
}
