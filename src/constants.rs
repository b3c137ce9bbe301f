//! MQTT protocol constants for the publish path
//!
//! Fixed header bytes, bit masks and negotiated-limit defaults, kept here so the
//! codec and the client never carry magic numbers.

use crate::PacketType;

/// Fixed header byte 1 values (packet type << 4 | flags)
pub mod fixed_header {
    /// PUBLISH packet fixed header base (0x30) - flags vary
    pub const PUBLISH_BASE: u8 = (super::PacketType::Publish as u8) << 4;

    /// PUBACK packet fixed header (0x40)
    pub const PUBACK: u8 = (super::PacketType::PubAck as u8) << 4;

    /// PUBREC packet fixed header (0x50)
    pub const PUBREC: u8 = (super::PacketType::PubRec as u8) << 4;

    /// PUBREL packet fixed header (0x62) - has required flags
    pub const PUBREL: u8 = (super::PacketType::PubRel as u8) << 4 | 0x02;

    /// PUBCOMP packet fixed header (0x70)
    pub const PUBCOMP: u8 = (super::PacketType::PubComp as u8) << 4;

    /// DISCONNECT packet fixed header (0xE0)
    pub const DISCONNECT: u8 = (super::PacketType::Disconnect as u8) << 4;
}

/// Masks for extracting fields from fixed header
pub mod masks {
    /// Mask for extracting packet type from fixed header byte 1 (0xF0)
    pub const PACKET_TYPE: u8 = 0xF0;

    /// Mask for extracting flags from fixed header byte 1 (0x0F)
    pub const FLAGS: u8 = 0x0F;

    /// Mask for checking continuation bit in variable byte integer (0x80)
    pub const CONTINUATION_BIT: u8 = 0x80;

    /// Mask for extracting value from variable byte integer (0x7F)
    pub const VARIABLE_BYTE_VALUE: u8 = 0x7F;
}

/// PUBLISH flags masks
pub mod publish_flags {
    /// RETAIN flag (bit 0)
    pub const RETAIN: u8 = 0x01;
    /// DUP flag (bit 3)
    pub const DUP: u8 = 0x08;
    /// Mask for clearing `QoS` bits (bits 1-2)
    pub const QOS_CLEAR_MASK: u8 = !0x06;
    /// Mask for extracting `QoS` (bits 1-2 shifted)
    pub const QOS_MASK: u8 = 0x03;
    /// Shift for `QoS`
    pub const QOS_SHIFT: u8 = 1;
}

/// String and binary data limits
pub mod limits {
    /// Maximum string length in MQTT (65535)
    pub const MAX_STRING_LENGTH: u16 = u16::MAX;

    /// Maximum binary data length (65535)
    pub const MAX_BINARY_LENGTH: u16 = u16::MAX;

    /// Maximum number of bytes in a variable byte integer
    pub const MAX_VARIABLE_INT_BYTES: usize = 4;
}

/// Values assumed when the server did not send the corresponding CONNACK property
pub mod defaults {
    use std::time::Duration;

    /// Receive maximum meaning "no limit on in-flight throttled sends"
    pub const RECEIVE_MAXIMUM: u16 = u16::MAX;

    /// Highest `QoS` the server accepts when it does not say otherwise
    pub const MAXIMUM_QOS: u8 = 2;

    /// Largest packet the client sends when the server does not advertise a limit
    pub const MAXIMUM_PACKET_SIZE: u32 = 268_435_460;

    /// Topic aliases are disabled unless the server advertises a maximum
    pub const TOPIC_ALIAS_MAXIMUM: u16 = 0;

    /// A reply waiter older than this is considered expired
    pub const MAX_REPLY_TIME: Duration = Duration::from_secs(20);
}

/// Serial numbers used by the sender to order queued writes
pub mod serial {
    /// Number of bits in a serial number
    pub const SERIAL_BITS: u32 = 32;

    /// Serial number used by writes that are not part of an ordered exchange
    pub const NO_SERIAL: u32 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_header_values() {
        assert_eq!(fixed_header::PUBLISH_BASE, 0x30);
        assert_eq!(fixed_header::PUBACK, 0x40);
        assert_eq!(fixed_header::PUBREC, 0x50);
        assert_eq!(fixed_header::PUBREL, 0x62);
        assert_eq!(fixed_header::PUBCOMP, 0x70);
        assert_eq!(fixed_header::DISCONNECT, 0xE0);
    }

    #[test]
    fn test_publish_flag_masks() {
        assert_eq!(publish_flags::QOS_CLEAR_MASK, 0xF9);
        assert_eq!(
            (0x04 >> publish_flags::QOS_SHIFT) & publish_flags::QOS_MASK,
            2
        );
    }
}
