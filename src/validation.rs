use crate::error::{MqttError, Result};

/// Characters an MQTT UTF-8 string must not contain
///
/// U+0000, the C0 controls, DEL and the C1 controls.
fn is_disallowed_char(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

/// Validates an MQTT UTF-8 encoded string
///
/// # Rules:
/// - At most 65,535 bytes when encoded
/// - No null character (U+0000)
/// - No control characters (U+0001..U+001F, U+007F..U+009F)
#[must_use]
pub fn is_valid_mqtt_utf8(s: &str) -> bool {
    s.len() <= crate::constants::limits::MAX_STRING_LENGTH as usize
        && !s.chars().any(is_disallowed_char)
}

/// Validates a payload declared as UTF-8 by the payload format indicator
///
/// Same character rules as [`is_valid_mqtt_utf8`] without the length cap, since the
/// payload is not length-prefixed.
#[must_use]
pub fn is_valid_utf8_payload(payload: &[u8]) -> bool {
    std::str::from_utf8(payload).is_ok_and(|s| !s.chars().any(is_disallowed_char))
}

/// Validates an MQTT topic name
///
/// # Rules:
/// - Must have at least one character
/// - Must be a valid MQTT UTF-8 string
/// - Must not contain wildcard characters (+, #)
#[must_use]
pub fn is_valid_topic_name(topic: &str) -> bool {
    !topic.is_empty() && is_valid_topic_alias_name(topic)
}

/// Validates the topic name of a PUBLISH that carries a topic alias
///
/// The name may be empty, in which case the alias alone identifies the topic.
#[must_use]
pub fn is_valid_topic_alias_name(topic: &str) -> bool {
    is_valid_mqtt_utf8(topic) && !topic.contains(['+', '#'])
}

/// Validates a user property key/value pair
#[must_use]
pub fn is_valid_string_pair(key: &str, value: &str) -> bool {
    is_valid_mqtt_utf8(key) && is_valid_mqtt_utf8(value)
}

/// Validates a topic name and returns an error if invalid
///
/// # Errors
///
/// Returns `MqttError::InvalidTopicName` if the topic name:
/// - Is empty
/// - Is not a valid MQTT UTF-8 string
/// - Contains wildcard characters (+, #)
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if !is_valid_topic_name(topic) {
        return Err(MqttError::InvalidTopicName(topic.to_string()));
    }
    Ok(())
}
