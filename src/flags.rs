//! PUBLISH fixed header flags using `BeBytes` flag decomposition

use crate::constants::publish_flags::{DUP, QOS_CLEAR_MASK, QOS_MASK, QOS_SHIFT};
use bebytes::BeBytes;

/// Flags for MQTT PUBLISH packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, BeBytes)]
#[bebytes(flags)]
pub enum PublishFlags {
    /// Retain flag
    Retain = 0x01,
    /// `QoS` bit 0
    QoS0 = 0x02,
    /// `QoS` bit 1
    QoS1 = 0x04,
    /// Duplicate delivery flag
    Dup = 0x08,
}

impl PublishFlags {
    /// Extract `QoS` value from flags
    #[must_use]
    pub fn extract_qos(flags: u8) -> u8 {
        (flags >> QOS_SHIFT) & QOS_MASK
    }

    /// Create flags byte with `QoS` value
    #[must_use]
    pub fn with_qos(flags: u8, qos: u8) -> u8 {
        (flags & QOS_CLEAR_MASK) | ((qos & QOS_MASK) << QOS_SHIFT)
    }

    #[must_use]
    pub fn is_dup(flags: u8) -> bool {
        Self::decompose(flags).contains(&Self::Dup)
    }

    #[must_use]
    pub fn is_retain(flags: u8) -> bool {
        Self::decompose(flags).contains(&Self::Retain)
    }
}

/// Sets the DUP bit of an already encoded PUBLISH in place
///
/// Only the first byte is touched; the rest of the packet is resent unchanged.
pub fn set_dup(wire: &mut [u8]) {
    if let Some(first) = wire.first_mut() {
        *first |= DUP;
    }
}
