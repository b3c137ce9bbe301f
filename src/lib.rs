//! # MQTT v5.0 Publish Path
//!
//! The client side of the MQTT v5.0 publish exchange: the wire codec for PUBLISH, its
//! acknowledgments and DISCONNECT, a flow-controlled sender honouring the server's
//! receive maximum, and one publish state machine per QoS level.
//!
//! The library never opens connections. The caller establishes the session and hands the
//! halves of the socket to a [`ClientService`], which every publish shares.
//!
//! Background work is plain async tasks (see [`tasks`]); the `QoS` level of a publish is
//! chosen at compile time through [`AtMostOnce`], [`AtLeastOnce`] and [`ExactlyOnce`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mqtt5_publish::{ClientService, ExactlyOnce, PublishOptions};
//! use mqtt5_publish::client::IoStream;
//!
//! # async fn run(socket: tokio::net::tcp::OwnedWriteHalf) -> mqtt5_publish::Result<()> {
//! let svc = ClientService::new(IoStream::new(socket));
//!
//! let options = PublishOptions::default()
//!     .with_retain(true)
//!     .with_payload_format_indicator(true);
//! let ack = svc.publish::<ExactlyOnce>("sensors/door", "open", options).await?;
//! println!("server answered {}", ack.reason_code);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]

pub mod client;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod flags;
pub mod packet;
pub mod packet_id;
pub mod protocol;
pub mod tasks;
#[cfg(test)]
pub mod test_utils;
pub mod types;
pub mod validation;

pub use client::{
    AtLeastOnce, AtMostOnce, CancellationToken, ClientService, ExactlyOnce, QosPolicy,
};
pub use error::{MqttError, Result};
pub use packet::{AckPacket, DisconnectPacket, FixedHeader, PacketType, PublishPacket};
pub use protocol::v5::properties::{Properties, PropertyId, PropertyValue, PropertyValueType};
pub use protocol::v5::reason_codes::ReasonCode;
pub use types::{
    AckProperties, ConnackProperties, DisconnectProperties, PublishAck, PublishOptions,
    PublishProperties,
};
pub use validation::{is_valid_topic_name, validate_topic_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<u8> for QoS {
    fn from(value: u8) -> Self {
        match value {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            // PUBLISH decoding rejects 3 before it gets here
            _ => QoS::AtMostOnce,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}
