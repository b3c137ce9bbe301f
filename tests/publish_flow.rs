mod common;

use bytes::Bytes;
use common::{init_tracing, publish_header, GatedStream, MockStream, DEFAULT_TIMEOUT};
use mqtt5_publish::client::{PacketReader, Stream};
use mqtt5_publish::constants::fixed_header;
use mqtt5_publish::packet::decode_packet;
use mqtt5_publish::tasks::spawn_packet_reader;
use mqtt5_publish::{
    AtLeastOnce, AtMostOnce, CancellationToken, ClientService, ConnackProperties,
    DisconnectPacket, ExactlyOnce, MqttError, PacketType, PublishOptions, PublishPacket, QoS,
    QosPolicy, ReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

type Service = Arc<ClientService<MockStream>>;

fn service() -> (Service, MockStream) {
    init_tracing();
    let stream = MockStream::new();
    (ClientService::new(stream.clone()), stream)
}

async fn ack(svc: &Service, packet: &'static [u8]) {
    svc.dispatch_packet(Bytes::from_static(packet))
        .await
        .expect("valid framing");
}

fn disconnects(packets: &[Bytes]) -> Vec<DisconnectPacket> {
    packets
        .iter()
        .filter(|p| p[0] == fixed_header::DISCONNECT)
        .map(|p| {
            decode_packet::<DisconnectPacket, _>(&mut p.clone(), PacketType::Disconnect).unwrap()
        })
        .collect()
}

fn spawn_publish<Q, S>(
    svc: &Arc<ClientService<S>>,
    payload: &'static str,
) -> JoinHandle<mqtt5_publish::Result<Q::Outcome>>
where
    Q: QosPolicy,
    Q::Outcome: 'static,
    S: Stream,
{
    let svc = Arc::clone(svc);
    tokio::spawn(async move { svc.publish::<Q>("t", payload, PublishOptions::default()).await })
}

fn decode_publish(packet: &Bytes) -> PublishPacket {
    decode_packet(&mut packet.clone(), PacketType::Publish).unwrap()
}

#[tokio::test]
async fn test_qos0_publish_writes_once_without_packet_id() {
    let (svc, stream) = service();

    svc.publish::<AtMostOnce>("a/b", "hi", PublishOptions::default())
        .await
        .unwrap();

    assert_eq!(
        stream.written().await,
        vec![Bytes::from_static(&[0x30, 0x08, 0x00, 0x03, b'a', b'/', b'b', 0x00, b'h', b'i'])]
    );
    assert_eq!(svc.packet_ids_in_use().await, 0);
}

#[tokio::test]
async fn test_qos1_publish_completes_on_puback() {
    let (svc, stream) = service();

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");

    let written = stream.wait_for_packets(1).await;
    assert_eq!(
        &written[0][..],
        &[0x32, 0x07, 0x00, 0x01, b't', 0x00, 0x01, 0x00, b'x']
    );
    assert_eq!(svc.packet_ids_in_use().await, 1);

    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    let puback = task.await.unwrap().unwrap();
    assert_eq!(puback.reason_code, ReasonCode::SUCCESS);
    assert!(puback.properties.is_empty());
    assert_eq!(svc.packet_ids_in_use().await, 0);

    // the identifier went back to the pool
    let next = spawn_publish::<AtLeastOnce, _>(&svc, "y");
    let written = stream.wait_for_packets(2).await;
    let mut second = written[1].clone();
    let packet: PublishPacket = decode_packet(&mut second, PacketType::Publish).unwrap();
    assert_eq!(packet.packet_id, Some(1));
    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    next.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_qos1_reports_server_reason_and_properties() {
    let (svc, stream) = service();

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;
    ack(&svc, &[0x40, 0x08, 0x00, 0x01, 0x10, 0x04, 0x1F, 0x00, 0x01, b'n']).await;

    let puback = task.await.unwrap().unwrap();
    assert_eq!(puback.reason_code.value(), 0x10);
    assert!(puback.is_success());
    assert_eq!(puback.properties.reason_string.as_deref(), Some("n"));
}

#[tokio::test]
async fn test_qos1_rejection_is_not_an_error() {
    let (svc, stream) = service();

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;
    ack(&svc, &[0x40, 0x03, 0x00, 0x01, 0x87]).await;

    let puback = task.await.unwrap().unwrap();
    assert_eq!(puback.reason_code, ReasonCode::NOT_AUTHORIZED);
    assert!(!puback.is_success());
    assert_eq!(stream.written().await.len(), 1);
    assert_eq!(svc.packet_ids_in_use().await, 0);
}

#[tokio::test]
async fn test_qos2_publish_runs_full_handshake() {
    let (svc, stream) = service();

    let task = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move {
            svc.publish::<ExactlyOnce>("t", "x", PublishOptions::default().with_retain(true))
                .await
        })
    };

    let written = stream.wait_for_packets(1).await;
    assert_eq!(written[0][0], publish_header(0x05));

    ack(&svc, &[0x50, 0x02, 0x00, 0x01]).await;
    let written = stream.wait_for_packets(2).await;
    assert_eq!(&written[1][..], &[fixed_header::PUBREL, 0x02, 0x00, 0x01]);

    ack(&svc, &[0x70, 0x02, 0x00, 0x01]).await;
    let pubcomp = task.await.unwrap().unwrap();
    assert_eq!(pubcomp.reason_code, ReasonCode::SUCCESS);
    assert_eq!(stream.written().await.len(), 2);
    assert_eq!(svc.packet_ids_in_use().await, 0);
}

#[tokio::test]
async fn test_qos2_pubrec_error_ends_exchange() {
    let (svc, stream) = service();

    let task = spawn_publish::<ExactlyOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;
    ack(&svc, &[0x50, 0x03, 0x00, 0x01, 0x97]).await;

    let pubrec = task.await.unwrap().unwrap();
    assert_eq!(pubrec.reason_code, ReasonCode::QUOTA_EXCEEDED);
    assert_eq!(stream.written().await.len(), 1);
    assert_eq!(svc.packet_ids_in_use().await, 0);
}

#[tokio::test]
async fn test_try_again_resends_with_dup_and_same_packet_id() {
    let (svc, stream) = service();
    stream.fail_next_write(MqttError::TryAgain).await;

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");

    stream.wait_for_packets(1).await;
    let attempted = stream.attempted().await;
    assert_eq!(attempted.len(), 2);
    assert_eq!(attempted[1][0], attempted[0][0] | 0x08);
    assert_eq!(attempted[1][1..], attempted[0][1..]);
    assert_eq!(svc.packet_ids_in_use().await, 1);

    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_oversize_publish_is_never_sent() {
    init_tracing();
    let stream = MockStream::new();
    let svc = ClientService::with_connack_properties(
        stream.clone(),
        ConnackProperties::default().with_maximum_packet_size(16),
    );

    let result = svc
        .publish::<AtLeastOnce>("t", vec![0u8; 64], PublishOptions::default())
        .await;
    assert!(matches!(result, Err(MqttError::PacketTooLarge { max: 16, .. })));
    assert!(stream.attempted().await.is_empty());
    assert_eq!(svc.packet_ids_in_use().await, 0);
}

#[tokio::test]
async fn test_packet_id_exhaustion_fails_without_io() {
    let (svc, stream) = service();
    for _ in 0..u16::MAX {
        assert_ne!(svc.allocate_pid().await, 0);
    }

    let result = svc
        .publish::<ExactlyOnce>("t", "x", PublishOptions::default())
        .await;
    assert_eq!(result, Err(MqttError::PacketIdExhausted));
    assert!(stream.attempted().await.is_empty());

    // QoS 0 needs no identifier
    svc.publish::<AtMostOnce>("t", "x", PublishOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_reason_code_disconnects_and_resends() {
    let (svc, stream) = service();

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;

    // 0x04 is only legal in DISCONNECT
    ack(&svc, &[0x40, 0x03, 0x00, 0x01, 0x04]).await;
    let written = stream.wait_for_packets(3).await;

    let sent = disconnects(&written);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reason_code, ReasonCode::MALFORMED_PACKET);
    assert_eq!(
        sent[0].properties.reason_string.as_deref(),
        Some("Malformed PUBACK: invalid Reason Code")
    );

    let resent: Vec<_> = written
        .iter()
        .filter(|p| p[0] == publish_header(0x0A))
        .collect();
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0][1..], written[0][1..]);

    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    task.await.unwrap().unwrap();
    assert_eq!(disconnects(&stream.written().await).len(), 1);
}

#[tokio::test]
async fn test_undecodable_puback_disconnects_and_resends() {
    let (svc, stream) = service();

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;

    // property length runs past the end of the packet
    ack(&svc, &[0x40, 0x04, 0x00, 0x01, 0x00, 0x05]).await;
    let written = stream.wait_for_packets(3).await;

    let sent = disconnects(&written);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].properties.reason_string.as_deref(),
        Some("Malformed PUBACK: cannot decode")
    );
    assert!(written.iter().any(|p| p[0] == publish_header(0x0A)));

    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_pubcomp_resends_pubrel() {
    let (svc, stream) = service();

    let task = spawn_publish::<ExactlyOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;
    ack(&svc, &[0x50, 0x02, 0x00, 0x01]).await;
    stream.wait_for_packets(2).await;

    // 0x10 is legal in PUBACK and PUBREC but not in PUBCOMP
    ack(&svc, &[0x70, 0x03, 0x00, 0x01, 0x10]).await;
    let written = stream.wait_for_packets(4).await;

    assert_eq!(
        disconnects(&written)[0].properties.reason_string.as_deref(),
        Some("Malformed PUBCOMP: invalid Reason Code")
    );
    let pubrels = written
        .iter()
        .filter(|p| p[0] == fixed_header::PUBREL)
        .count();
    assert_eq!(pubrels, 2);

    ack(&svc, &[0x70, 0x02, 0x00, 0x01]).await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_validation_errors_before_io() {
    init_tracing();
    let stream = MockStream::new();
    let svc = ClientService::with_connack_properties(
        stream.clone(),
        ConnackProperties::default()
            .with_maximum_qos(1)
            .with_retain_available(false),
    );

    assert!(matches!(
        svc.publish::<AtMostOnce>("a/#", "x", PublishOptions::default()).await,
        Err(MqttError::InvalidTopicName(_))
    ));
    assert_eq!(
        svc.publish::<ExactlyOnce>("a", "x", PublishOptions::default())
            .await,
        Err(MqttError::QoSNotSupported)
    );
    assert_eq!(
        svc.publish::<AtLeastOnce>("a", "x", PublishOptions::default().with_retain(true))
            .await,
        Err(MqttError::RetainNotSupported)
    );
    assert!(matches!(
        svc.publish::<AtLeastOnce>(
            "a",
            vec![0xC3, 0x28],
            PublishOptions::default().with_payload_format_indicator(true)
        )
        .await,
        Err(MqttError::MalformedPacket(_))
    ));

    assert!(stream.attempted().await.is_empty());
    assert_eq!(svc.packet_ids_in_use().await, 0);
}

#[tokio::test]
async fn test_publish_properties_reach_the_wire() {
    init_tracing();
    let stream = MockStream::new();
    let svc = ClientService::with_connack_properties(
        stream.clone(),
        ConnackProperties::default().with_topic_alias_maximum(10),
    );

    let options = PublishOptions::default()
        .with_topic_alias(3)
        .with_message_expiry_interval(60)
        .with_correlation_data(Bytes::from_static(b"c1"))
        .with_user_property("k", "v");
    svc.publish::<AtMostOnce>("", "payload", options).await.unwrap();

    let mut written = stream.written().await.remove(0);
    let packet: PublishPacket = decode_packet(&mut written, PacketType::Publish).unwrap();
    let props = packet.publish_properties();
    assert_eq!(packet.qos, QoS::AtMostOnce);
    assert_eq!(packet.topic_name, "");
    assert_eq!(props.topic_alias, Some(3));
    assert_eq!(props.message_expiry_interval, Some(60));
    assert_eq!(props.correlation_data.as_deref(), Some(&b"c1"[..]));
    assert_eq!(props.user_properties, vec![("k".to_string(), "v".to_string())]);
}

#[tokio::test]
async fn test_cancellation_token_cancels_client() {
    let (svc, stream) = service();
    let token = CancellationToken::new();

    let task = {
        let svc = Arc::clone(&svc);
        let token = token.clone();
        tokio::spawn(async move {
            let options = PublishOptions::default();
            svc.publish_with_cancellation::<AtLeastOnce>("t", "x", options, &token)
                .await
        })
    };
    stream.wait_for_packets(1).await;

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Err(MqttError::OperationAborted));
    assert!(svc.is_cancelled());
    assert!(stream.close_count() >= 1);
    assert_eq!(svc.packet_ids_in_use().await, 0);

    assert_eq!(
        svc.publish::<AtMostOnce>("t", "x", PublishOptions::default())
            .await,
        Err(MqttError::OperationAborted)
    );
}

#[tokio::test]
async fn test_receive_maximum_holds_back_publishes() {
    init_tracing();
    let stream = MockStream::new();
    let svc = ClientService::with_connack_properties(
        stream.clone(),
        ConnackProperties::default().with_receive_maximum(1),
    );

    let first = spawn_publish::<AtLeastOnce, _>(&svc, "1");
    stream.wait_for_packets(1).await;

    let second = spawn_publish::<AtLeastOnce, _>(&svc, "2");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stream.written().await.len(), 1);

    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    first.await.unwrap().unwrap();

    let written = stream.wait_for_packets(2).await;
    let mut held = written[1].clone();
    let packet: PublishPacket = decode_packet(&mut held, PacketType::Publish).unwrap();
    assert_eq!(packet.packet_id, Some(2));
    assert_eq!(&packet.payload[..], b"2");

    ack(&svc, &[0x40, 0x02, 0x00, 0x02]).await;
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnect_resends_unacknowledged_publish() {
    let (svc, stream) = service();

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;

    svc.on_reconnect(stream.clone(), ConnackProperties::default(), true)
        .await;
    let written = stream.wait_for_packets(2).await;
    let mut resent = written[1].clone();
    let packet: PublishPacket = decode_packet(&mut resent, PacketType::Publish).unwrap();
    assert!(packet.dup);
    assert_eq!(packet.packet_id, Some(1));

    ack(&svc, &[0x40, 0x02, 0x00, 0x01]).await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_acks_arrive_through_packet_reader() {
    let (svc, stream) = service();
    let (client_io, mut server_io) = tokio::io::duplex(64);
    let reader = spawn_packet_reader(Arc::clone(&svc), PacketReader::new(client_io));

    let task = spawn_publish::<ExactlyOnce, _>(&svc, "x");
    stream.wait_for_packets(1).await;
    server_io.write_all(&[0x50, 0x02, 0x00, 0x01]).await.unwrap();
    stream.wait_for_packets(2).await;
    server_io.write_all(&[0x70, 0x02, 0x00, 0x01]).await.unwrap();

    let pubcomp = task.await.unwrap().unwrap();
    assert_eq!(pubcomp.reason_code, ReasonCode::SUCCESS);

    drop(server_io);
    reader.await.unwrap();
}

#[tokio::test]
async fn test_disconnect_cancels_client() {
    let (svc, stream) = service();

    svc.disconnect(ReasonCode::NORMAL_DISCONNECTION, Default::default())
        .await
        .unwrap();

    let written = stream.written().await;
    assert_eq!(&written[0][..], &[fixed_header::DISCONNECT, 0x02, 0x00, 0x00]);
    assert!(svc.is_cancelled());
}

#[tokio::test]
async fn test_cancel_aborts_write_stuck_in_stream() {
    init_tracing();
    let stream = GatedStream::new();
    let svc = ClientService::new(stream.clone());

    let task = spawn_publish::<AtLeastOnce, _>(&svc, "x");
    stream.wait_for_writes(1).await;

    tokio::time::timeout(DEFAULT_TIMEOUT, svc.cancel())
        .await
        .expect("cancel waited for the stuck write");
    let result = tokio::time::timeout(DEFAULT_TIMEOUT, task)
        .await
        .expect("publish never completed")
        .unwrap();

    assert!(matches!(result, Err(MqttError::OperationAborted)));
    assert_eq!(stream.recorder().close_count(), 1);
    assert!(stream.recorder().written().await.is_empty());
}

#[tokio::test]
async fn test_reconnect_during_write_resends_unacknowledged_publish() {
    init_tracing();
    let old = GatedStream::new();
    let new = GatedStream::new();
    new.open();
    let svc = ClientService::new(old.clone());

    let first = spawn_publish::<AtLeastOnce, _>(&svc, "1");
    old.wait_for_writes(1).await;

    let second = spawn_publish::<AtLeastOnce, _>(&svc, "2");
    tokio::time::timeout(DEFAULT_TIMEOUT, async {
        while svc.queued_writes().await == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("second publish never queued");

    let reconnect = {
        let svc = Arc::clone(&svc);
        let new = new.clone();
        tokio::spawn(async move {
            svc.on_reconnect(new, ConnackProperties::default(), true).await;
        })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    old.open();
    reconnect.await.unwrap();

    // both publishes go out again on the new connection marked as duplicates
    let resent = tokio::time::timeout(DEFAULT_TIMEOUT, async {
        loop {
            let written = new.recorder().wait_for_packets(1).await;
            let mut ids: Vec<u16> = written
                .iter()
                .map(decode_publish)
                .filter(|p| p.dup)
                .filter_map(|p| p.packet_id)
                .collect();
            ids.sort_unstable();
            ids.dedup();
            if ids == [1, 2] {
                return written;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("unacknowledged publishes were not resent");
    assert!(resent.iter().all(|p| p[0] & 0xF0 == publish_header(0)));

    svc.dispatch_packet(Bytes::from_static(&[0x40, 0x02, 0x00, 0x01]))
        .await
        .unwrap();
    svc.dispatch_packet(Bytes::from_static(&[0x40, 0x02, 0x00, 0x02]))
        .await
        .unwrap();
    assert_eq!(first.await.unwrap().unwrap().reason_code, ReasonCode::SUCCESS);
    assert_eq!(second.await.unwrap().unwrap().reason_code, ReasonCode::SUCCESS);
}
