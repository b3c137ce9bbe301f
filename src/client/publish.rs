//! One application publish, driven to completion for a statically chosen QoS
//!
//! The QoS level selects a [`QosPolicy`] at compile time. Each policy supplies its own
//! handshake: QoS 0 writes once, QoS 1 waits for PUBACK, QoS 2 runs PUBLISH/PUBREC and
//! then PUBREL/PUBCOMP. Shared steps (packet identifier bookkeeping, delivery, ack
//! decoding and the DUP-marked resend) live on [`PublishSendOp`].

use crate::client::disconnect::{spawn_disconnect, DisconnectContext};
use crate::client::sender::SendFlags;
use crate::client::service::ClientService;
use crate::client::stream::Stream;
use crate::error::{MqttError, Result};
use crate::flags::set_dup;
use crate::packet::{AckPacket, MqttPacket, PacketType, PublishPacket};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::{ConnackProperties, DisconnectProperties, PublishAck, PublishOptions};
use crate::validation::{
    is_valid_mqtt_utf8, is_valid_string_pair, is_valid_topic_alias_name, is_valid_topic_name,
    is_valid_utf8_payload,
};
use crate::QoS;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
}

/// Per-QoS handshake of a publish
pub trait QosPolicy: sealed::Sealed + Send + Sync + 'static {
    const QOS: QoS;

    /// What a successful publish resolves to
    type Outcome: Send;

    /// Runs the handshake for an already validated and encoded PUBLISH
    fn exchange<S: Stream>(
        op: &mut PublishSendOp<S>,
        wire: Bytes,
    ) -> impl Future<Output = Result<Self::Outcome>> + Send;
}

/// QoS 0: fire and forget
#[derive(Debug, Clone, Copy)]
pub struct AtMostOnce;

/// QoS 1: PUBLISH, PUBACK
#[derive(Debug, Clone, Copy)]
pub struct AtLeastOnce;

/// QoS 2: PUBLISH, PUBREC, PUBREL, PUBCOMP
#[derive(Debug, Clone, Copy)]
pub struct ExactlyOnce;

impl sealed::Sealed for AtMostOnce {}
impl sealed::Sealed for AtLeastOnce {}
impl sealed::Sealed for ExactlyOnce {}

enum Delivery {
    Reply(Bytes),
    Resend,
    Failed(MqttError),
}

impl QosPolicy for AtMostOnce {
    const QOS: QoS = QoS::AtMostOnce;
    type Outcome = ();

    async fn exchange<S: Stream>(op: &mut PublishSendOp<S>, wire: Bytes) -> Result<()> {
        loop {
            match op.svc.async_send(wire.clone(), op.serial, SendFlags::NONE).await {
                Err(MqttError::TryAgain) => {
                    if op.svc.is_cancelled() {
                        return Err(MqttError::OperationAborted);
                    }
                    tracing::debug!("Resending QoS 0 PUBLISH");
                }
                result => return result,
            }
        }
    }
}

impl QosPolicy for AtLeastOnce {
    const QOS: QoS = QoS::AtLeastOnce;
    type Outcome = PublishAck;

    async fn exchange<S: Stream>(op: &mut PublishSendOp<S>, mut wire: Bytes) -> Result<PublishAck> {
        loop {
            match op.deliver(PacketType::PubAck, &wire, SendFlags::THROTTLED).await {
                Delivery::Reply(body) => {
                    if let Some(puback) = op.decode_ack(PacketType::PubAck, body) {
                        tracing::debug!(
                            packet_id = op.packet_id,
                            reason_code = %puback.reason_code,
                            "PUBACK received"
                        );
                        return op.complete(Ok(final_ack(puback))).await;
                    }
                }
                Delivery::Resend => {}
                Delivery::Failed(e) => return op.complete(Err(e)).await,
            }
            if let Err(e) = op.prepare_resend(&mut wire) {
                return op.complete(Err(e)).await;
            }
        }
    }
}

impl QosPolicy for ExactlyOnce {
    const QOS: QoS = QoS::ExactlyOnce;
    type Outcome = PublishAck;

    async fn exchange<S: Stream>(op: &mut PublishSendOp<S>, mut wire: Bytes) -> Result<PublishAck> {
        let pubrec = loop {
            match op.deliver(PacketType::PubRec, &wire, SendFlags::THROTTLED).await {
                Delivery::Reply(body) => {
                    if let Some(pubrec) = op.decode_ack(PacketType::PubRec, body) {
                        break pubrec;
                    }
                }
                Delivery::Resend => {}
                Delivery::Failed(e) => return op.complete(Err(e)).await,
            }
            if let Err(e) = op.prepare_resend(&mut wire) {
                return op.complete(Err(e)).await;
            }
        };

        tracing::debug!(
            packet_id = op.packet_id,
            reason_code = %pubrec.reason_code,
            "PUBREC received"
        );
        if pubrec.reason_code.is_error() {
            return op.complete(Ok(final_ack(pubrec))).await;
        }

        let pubrel = match AckPacket::pubrel(op.packet_id).to_bytes() {
            Ok(buf) => buf.freeze(),
            Err(e) => return op.complete(Err(e)).await,
        };

        let mut flags = SendFlags::PRIORITIZED;
        loop {
            match op.deliver(PacketType::PubComp, &pubrel, flags).await {
                Delivery::Reply(body) => {
                    if let Some(pubcomp) = op.decode_ack(PacketType::PubComp, body) {
                        tracing::debug!(
                            packet_id = op.packet_id,
                            reason_code = %pubcomp.reason_code,
                            "PUBCOMP received"
                        );
                        return op.complete(Ok(final_ack(pubcomp))).await;
                    }
                }
                Delivery::Resend => {}
                Delivery::Failed(e) => return op.complete(Err(e)).await,
            }
            tracing::debug!(packet_id = op.packet_id, "Resending PUBREL");
            flags = SendFlags::PRIORITIZED | SendFlags::THROTTLED;
        }
    }
}

fn final_ack(ack: AckPacket) -> PublishAck {
    PublishAck {
        reason_code: ack.reason_code,
        properties: ack.properties,
    }
}

fn ack_name(code: PacketType) -> &'static str {
    match code {
        PacketType::PubAck => "PUBACK",
        PacketType::PubRec => "PUBREC",
        PacketType::PubRel => "PUBREL",
        _ => "PUBCOMP",
    }
}

/// State of one publish in flight
#[derive(Debug)]
pub struct PublishSendOp<S: Stream> {
    svc: Arc<ClientService<S>>,
    packet_id: u16,
    serial: u32,
}

impl<S: Stream> PublishSendOp<S> {
    pub(crate) async fn perform<Q: QosPolicy>(
        svc: Arc<ClientService<S>>,
        topic: String,
        payload: Bytes,
        options: PublishOptions,
    ) -> Result<Q::Outcome> {
        let mut op = Self {
            svc,
            packet_id: 0,
            serial: 0,
        };

        if Q::QOS != QoS::AtMostOnce {
            op.packet_id = op.svc.allocate_pid().await;
            if op.packet_id == 0 {
                tracing::warn!(topic = %topic, "No packet identifier left");
                return Err(MqttError::PacketIdExhausted);
            }
        }

        let connack = op.svc.connack_properties().await;
        if let Err(e) = validate_publish(Q::QOS, &topic, &payload, &options, &connack) {
            tracing::debug!(topic = %topic, error = %e, "PUBLISH rejected locally");
            return op.complete_immediate(Err(e)).await;
        }

        op.serial = op.svc.next_serial_num().await;

        let mut packet = PublishPacket::new(topic, payload, Q::QOS)
            .with_retain(options.retain)
            .with_properties(&options.properties);
        if op.packet_id != 0 {
            packet = packet.with_packet_id(op.packet_id);
        }

        let wire = match packet.to_bytes() {
            Ok(buf) => buf,
            Err(e) => return op.complete_immediate(Err(e)).await,
        };
        let max = connack.maximum_packet_size() as usize;
        if wire.len() > max {
            return op
                .complete_immediate(Err(MqttError::PacketTooLarge {
                    size: wire.len(),
                    max,
                }))
                .await;
        }

        tracing::debug!(
            topic = %packet.topic_name,
            qos = ?Q::QOS,
            packet_id = op.packet_id,
            size = wire.len(),
            "Sending PUBLISH"
        );
        Q::exchange(&mut op, wire.freeze()).await
    }

    /// Finishes before anything was handed to the sender
    async fn complete_immediate<T>(&self, result: Result<T>) -> Result<T> {
        if self.packet_id != 0 {
            self.svc.free_pid(self.packet_id, false).await;
        }
        result
    }

    /// Finishes an exchange that held a unit of send quota
    async fn complete<T>(&self, result: Result<T>) -> Result<T> {
        self.svc.free_pid(self.packet_id, true).await;
        result
    }

    /// Sends `wire` and waits for the `code` acknowledgment
    async fn deliver(&self, code: PacketType, wire: &Bytes, flags: SendFlags) -> Delivery {
        let waiter = self.svc.register_reply(code, self.packet_id).await;

        match self.svc.async_send(wire.clone(), self.serial, flags).await {
            Ok(()) => {}
            Err(MqttError::TryAgain) => return Delivery::Resend,
            Err(e) => return Delivery::Failed(e),
        }

        match waiter.wait().await {
            Ok(body) => Delivery::Reply(body),
            Err(MqttError::TryAgain) => Delivery::Resend,
            Err(e) => Delivery::Failed(e),
        }
    }

    /// Decodes an acknowledgment body, reporting a malformed one to the server
    fn decode_ack(&self, code: PacketType, mut body: Bytes) -> Option<AckPacket> {
        match AckPacket::decode_ack(code, &mut body) {
            Ok(ack) => Some(ack),
            Err(MqttError::InvalidReasonCode(byte)) => {
                tracing::warn!(
                    packet_id = self.packet_id,
                    reason_code = byte,
                    "Invalid reason code in {}",
                    ack_name(code)
                );
                self.on_malformed_packet(format!(
                    "Malformed {}: invalid Reason Code",
                    ack_name(code)
                ));
                None
            }
            Err(e) => {
                tracing::warn!(
                    packet_id = self.packet_id,
                    error = %e,
                    "Cannot decode {}",
                    ack_name(code)
                );
                self.on_malformed_packet(format!("Malformed {}: cannot decode", ack_name(code)));
                None
            }
        }
    }

    fn on_malformed_packet(&self, reason: String) {
        spawn_disconnect(
            Arc::clone(&self.svc),
            DisconnectContext::new(
                ReasonCode::MALFORMED_PACKET,
                DisconnectProperties::with_reason_string(reason),
            ),
        );
    }

    /// Marks the PUBLISH as a duplicate before it goes out again
    ///
    /// # Errors
    ///
    /// Returns `MqttError::OperationAborted` if the client was cancelled meanwhile
    fn prepare_resend(&self, wire: &mut Bytes) -> Result<()> {
        if self.svc.is_cancelled() {
            return Err(MqttError::OperationAborted);
        }
        tracing::debug!(packet_id = self.packet_id, "Resending PUBLISH with DUP");
        let mut dup = BytesMut::from(&wire[..]);
        set_dup(&mut dup);
        *wire = dup.freeze();
        Ok(())
    }
}

/// Checks a publish against the protocol and the server's limits before anything is sent
///
/// # Errors
///
/// - `MqttError::InvalidTopicName` for a bad topic (an empty topic is allowed only
///   together with a topic alias)
/// - `MqttError::QoSNotSupported` if `qos` exceeds the server's maximum
/// - `MqttError::RetainNotSupported` if retain is requested but unavailable
/// - `MqttError::TopicAliasMaximumReached` for an alias the server does not accept
/// - `MqttError::MalformedPacket` for an invalid property or a payload that does not
///   match its declared UTF-8 format
pub fn validate_publish(
    qos: QoS,
    topic: &str,
    payload: &[u8],
    options: &PublishOptions,
    connack: &ConnackProperties,
) -> Result<()> {
    let props = &options.properties;

    let topic_valid = if props.topic_alias.is_some() {
        is_valid_topic_alias_name(topic)
    } else {
        is_valid_topic_name(topic)
    };
    if !topic_valid {
        return Err(MqttError::InvalidTopicName(topic.to_string()));
    }

    if u8::from(qos) > connack.maximum_qos() {
        return Err(MqttError::QoSNotSupported);
    }

    if options.retain && !connack.retain_available() {
        return Err(MqttError::RetainNotSupported);
    }

    if props.payload_format_indicator == Some(true) && !is_valid_utf8_payload(payload) {
        return Err(MqttError::MalformedPacket(
            "Payload is not valid UTF-8".to_string(),
        ));
    }

    if let Some(alias) = props.topic_alias {
        let max = connack.topic_alias_maximum();
        if max == 0 || alias > max {
            return Err(MqttError::TopicAliasMaximumReached(alias));
        }
        if alias == 0 {
            return Err(MqttError::MalformedPacket("Topic alias 0".to_string()));
        }
    }

    if let Some(response_topic) = &props.response_topic {
        if !is_valid_topic_name(response_topic) {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid response topic {response_topic:?}"
            )));
        }
    }

    if !props
        .user_properties
        .iter()
        .all(|(k, v)| is_valid_string_pair(k, v))
    {
        return Err(MqttError::MalformedPacket(
            "Invalid user property".to_string(),
        ));
    }

    if !props.subscription_identifiers.is_empty() {
        return Err(MqttError::MalformedPacket(
            "Subscription identifier in outbound PUBLISH".to_string(),
        ));
    }

    if let Some(content_type) = &props.content_type {
        if !is_valid_mqtt_utf8(content_type) {
            return Err(MqttError::MalformedPacket(
                "Invalid content type".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockStream;

    fn limits() -> ConnackProperties {
        ConnackProperties::default()
    }

    #[test]
    fn test_valid_publish_passes() {
        let options = PublishOptions::default()
            .with_response_topic("reply/here")
            .with_content_type("text/plain")
            .with_user_property("k", "v");
        assert!(validate_publish(QoS::ExactlyOnce, "a/b", b"x", &options, &limits()).is_ok());
    }

    #[test]
    fn test_topic_rules_depend_on_alias() {
        let plain = PublishOptions::default();
        assert_eq!(
            validate_publish(QoS::AtMostOnce, "", b"", &plain, &limits()),
            Err(MqttError::InvalidTopicName(String::new()))
        );

        let aliased = PublishOptions::default().with_topic_alias(1);
        let connack = limits().with_topic_alias_maximum(5);
        assert!(validate_publish(QoS::AtMostOnce, "", b"", &aliased, &connack).is_ok());
        assert!(matches!(
            validate_publish(QoS::AtMostOnce, "a/+", b"", &aliased, &connack),
            Err(MqttError::InvalidTopicName(_))
        ));
    }

    #[test]
    fn test_server_limits() {
        let options = PublishOptions::default();
        assert_eq!(
            validate_publish(QoS::ExactlyOnce, "t", b"", &options, &limits().with_maximum_qos(1)),
            Err(MqttError::QoSNotSupported)
        );

        let retained = PublishOptions::default().with_retain(true);
        let no_retain = limits().with_retain_available(false);
        assert_eq!(
            validate_publish(QoS::AtMostOnce, "t", b"", &retained, &no_retain),
            Err(MqttError::RetainNotSupported)
        );
    }

    #[test]
    fn test_topic_alias_limits() {
        let aliased = |alias| PublishOptions::default().with_topic_alias(alias);

        assert_eq!(
            validate_publish(QoS::AtMostOnce, "t", b"", &aliased(1), &limits()),
            Err(MqttError::TopicAliasMaximumReached(1))
        );
        let connack = limits().with_topic_alias_maximum(3);
        assert_eq!(
            validate_publish(QoS::AtMostOnce, "t", b"", &aliased(4), &connack),
            Err(MqttError::TopicAliasMaximumReached(4))
        );
        assert!(matches!(
            validate_publish(QoS::AtMostOnce, "t", b"", &aliased(0), &connack),
            Err(MqttError::MalformedPacket(_))
        ));
        assert!(validate_publish(QoS::AtMostOnce, "t", b"", &aliased(3), &connack).is_ok());
    }

    #[test]
    fn test_malformed_properties() {
        let cases = [
            PublishOptions::default().with_payload_format_indicator(true),
            PublishOptions::default().with_response_topic("a/#"),
            PublishOptions::default().with_user_property("k", "\u{0}"),
            PublishOptions::default().with_subscription_identifier(7),
            PublishOptions::default().with_content_type("\u{7F}"),
        ];
        for options in cases {
            assert!(
                matches!(
                    validate_publish(QoS::AtLeastOnce, "t", &[0xFF, 0xFE], &options, &limits()),
                    Err(MqttError::MalformedPacket(_))
                ),
                "{options:?} should be rejected"
            );
        }

        let utf8 = PublishOptions::default().with_payload_format_indicator(true);
        assert!(validate_publish(QoS::AtLeastOnce, "t", "ok".as_bytes(), &utf8, &limits()).is_ok());
    }

    #[tokio::test]
    async fn test_validation_failure_frees_packet_id() {
        let stream = MockStream::new();
        let svc = ClientService::new(stream.clone());

        let result = svc
            .publish::<AtLeastOnce>("bad/#", "x", PublishOptions::default())
            .await;
        assert!(matches!(result, Err(MqttError::InvalidTopicName(_))));
        assert_eq!(svc.packet_ids_in_use().await, 0);
        assert!(stream.attempted().await.is_empty());
    }

    #[tokio::test]
    async fn test_qos0_resends_without_dup() {
        let stream = MockStream::new();
        stream.fail_next_write(MqttError::TryAgain).await;
        let svc = ClientService::new(stream.clone());

        svc.publish::<AtMostOnce>("t", "x", PublishOptions::default())
            .await
            .unwrap();
        let attempted = stream.attempted().await;
        assert_eq!(attempted.len(), 2);
        assert_eq!(attempted[0], attempted[1]);
    }

    #[test]
    fn test_ack_names() {
        assert_eq!(ack_name(PacketType::PubAck), "PUBACK");
        assert_eq!(ack_name(PacketType::PubRec), "PUBREC");
        assert_eq!(ack_name(PacketType::PubComp), "PUBCOMP");
    }
}
