//! Background async tasks for the client
//!
//! Each task is a plain async function doing one job until its input ends.

use crate::client::disconnect::{spawn_disconnect, DisconnectContext};
use crate::client::{ClientService, PacketSource, Stream};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::DisconnectProperties;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Packet reader task - feeds inbound packets to the service
///
/// This task:
/// 1. Reads a complete packet from the source
/// 2. Dispatches it to the waiting operation
/// 3. Repeats until the source ends or the client is cancelled
///
/// A packet that cannot be dispatched is reported to the server with a DISCONNECT and
/// ends the task, since the framing can no longer be trusted.
pub async fn packet_reader_task<S: Stream, P: PacketSource>(
    svc: Arc<ClientService<S>>,
    mut source: P,
) {
    while !svc.is_cancelled() {
        match source.read_packet().await {
            Ok(Some(packet)) => {
                if let Err(e) = svc.dispatch_packet(packet).await {
                    tracing::warn!(error = %e, "Malformed inbound packet");
                    spawn_disconnect(
                        Arc::clone(&svc),
                        DisconnectContext::new(
                            ReasonCode::MALFORMED_PACKET,
                            DisconnectProperties::with_reason_string(e.to_string()),
                        ),
                    );
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error reading packet");
                break;
            }
        }
    }
}

pub fn spawn_packet_reader<S: Stream, P: PacketSource>(
    svc: Arc<ClientService<S>>,
    source: P,
) -> JoinHandle<()> {
    tokio::spawn(packet_reader_task(svc, source))
}
