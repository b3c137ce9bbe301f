use crate::protocol::v5::reason_codes::ReasonCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

/// Errors produced by the publish path
///
/// # Error Categories
///
/// - **Local validation**: `InvalidTopicName`, `QoSNotSupported`, `RetainNotSupported`,
///   `TopicAliasMaximumReached`, `PacketTooLarge`, `PacketIdExhausted`, `MalformedPacket`
/// - **Decoding**: `MalformedPacket`, `InvalidPacketType`, `InvalidReasonCode`,
///   `InvalidPropertyId`, `DuplicatePropertyId`
/// - **Transport**: `Io`, `NoRecovery`
/// - **Protocol signals**: `TryAgain`, `OperationAborted`
///
/// `TryAgain` never reaches the caller of a publish; the publish operation consumes it
/// and resends the in-flight packet.
///
/// # Examples
///
/// ```
/// use mqtt5_publish::{MqttError, Result};
///
/// fn check_alias(alias: u16, maximum: u16) -> Result<()> {
///     if alias > maximum {
///         return Err(MqttError::TopicAliasMaximumReached(alias));
///     }
///     Ok(())
/// }
///
/// assert!(check_alias(3, 10).is_ok());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid reason code: 0x{0:02X}")]
    InvalidReasonCode(u8),

    #[error("Invalid property ID: 0x{0:02X}")]
    InvalidPropertyId(u8),

    #[error("Duplicate property ID: 0x{0:02X}")]
    DuplicatePropertyId(u8),

    #[error("Publish rejected by server: {0}")]
    PublishFailed(ReasonCode),

    #[error("QoS not supported")]
    QoSNotSupported,

    #[error("Retain not supported")]
    RetainNotSupported,

    #[error("Topic alias {0} exceeds the server topic alias maximum")]
    TopicAliasMaximumReached(u16),

    #[error("Packet ID exhausted")]
    PacketIdExhausted,

    #[error("Operation should be retried")]
    TryAgain,

    #[error("Operation aborted")]
    OperationAborted,

    #[error("Connection cannot be recovered")]
    NoRecovery,
}

impl MqttError {
    /// Returns true for the resend signal produced by a reconnect
    #[must_use]
    pub fn is_try_again(&self) -> bool {
        matches!(self, Self::TryAgain)
    }

    /// Returns true when the client was cancelled underneath the operation
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::OperationAborted)
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for MqttError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        MqttError::OperationAborted
    }
}

// Error conversions for BeBytes compatibility
impl From<bebytes::BeBytesError> for MqttError {
    fn from(err: bebytes::BeBytesError) -> Self {
        MqttError::MalformedPacket(format!("{err:?}"))
    }
}

impl From<&str> for MqttError {
    fn from(msg: &str) -> Self {
        MqttError::MalformedPacket(msg.to_string())
    }
}
