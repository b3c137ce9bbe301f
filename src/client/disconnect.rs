//! Outbound DISCONNECT
//!
//! Used directly by [`ClientService::disconnect`] and, detached, by a publish that
//! received a malformed acknowledgment.

use crate::client::sender::SendFlags;
use crate::client::service::ClientService;
use crate::client::stream::Stream;
use crate::constants::serial::NO_SERIAL;
use crate::error::{MqttError, Result};
use crate::packet::{DisconnectPacket, MqttPacket};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::DisconnectProperties;
use crate::validation::{is_valid_mqtt_utf8, is_valid_string_pair};
use std::sync::Arc;
use std::time::Duration;

/// Time a terminal disconnect may take before the client is cancelled regardless
pub const TERMINAL_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectContext {
    pub reason_code: ReasonCode,
    pub properties: DisconnectProperties,
    /// Cancel the client once the packet is out, and keep resending until it is
    pub terminal: bool,
}

impl DisconnectContext {
    #[must_use]
    pub fn new(reason_code: ReasonCode, properties: DisconnectProperties) -> Self {
        Self {
            reason_code,
            properties,
            terminal: false,
        }
    }

    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

fn validate_disconnect(props: &DisconnectProperties) -> Result<()> {
    if props
        .reason_string
        .as_deref()
        .is_some_and(|reason| !is_valid_mqtt_utf8(reason))
    {
        return Err(MqttError::MalformedPacket(
            "Invalid DISCONNECT reason string".to_string(),
        ));
    }
    if !props
        .user_properties
        .iter()
        .all(|(k, v)| is_valid_string_pair(k, v))
    {
        return Err(MqttError::MalformedPacket(
            "Invalid DISCONNECT user property".to_string(),
        ));
    }
    Ok(())
}

/// Sends a DISCONNECT on its own and closes the stream
///
/// Properties that would push the packet past the server's maximum packet size are
/// dropped. A non-terminal disconnect interrupted by a reconnect is considered done.
///
/// # Errors
///
/// - `MqttError::MalformedPacket` if the reason string or a user property is invalid
/// - `MqttError::OperationAborted` if the client was cancelled or cannot recover
/// - The stream's error if the write failed
pub async fn async_disconnect<S: Stream>(
    svc: &Arc<ClientService<S>>,
    ctx: DisconnectContext,
) -> Result<()> {
    validate_disconnect(&ctx.properties)?;

    let max = svc.connack_properties().await.maximum_packet_size() as usize;
    let mut packet = DisconnectPacket::new(ctx.reason_code).with_properties(ctx.properties);
    if packet.encoded_len() > max {
        tracing::debug!(size = packet.encoded_len(), max, "Dropping DISCONNECT properties");
        packet.properties = DisconnectProperties::default();
    }
    let wire = packet.to_bytes()?.freeze();

    tracing::debug!(
        reason_code = %packet.reason_code,
        terminal = ctx.terminal,
        "Sending DISCONNECT"
    );
    loop {
        match svc.async_send(wire.clone(), NO_SERIAL, SendFlags::TERMINAL).await {
            Err(MqttError::OperationAborted | MqttError::NoRecovery) => {
                return Err(MqttError::OperationAborted);
            }
            Err(MqttError::TryAgain) if ctx.terminal => {}
            Err(MqttError::TryAgain) => return Ok(()),
            result => {
                svc.shutdown().await;
                if ctx.terminal {
                    svc.cancel().await;
                }
                return result;
            }
        }
    }
}

/// Sends a DISCONNECT in the background; failures are only logged
pub fn spawn_disconnect<S: Stream>(svc: Arc<ClientService<S>>, ctx: DisconnectContext) {
    tokio::spawn(async move {
        if let Err(e) = async_disconnect(&svc, ctx).await {
            tracing::debug!(error = %e, "Detached DISCONNECT failed");
        }
    });
}

/// Sends a DISCONNECT and cancels the client, bounded by
/// [`TERMINAL_DISCONNECT_TIMEOUT`]
///
/// # Errors
///
/// Same as [`async_disconnect`]; `MqttError::OperationAborted` on timeout
pub async fn terminal_disconnect<S: Stream>(
    svc: &Arc<ClientService<S>>,
    ctx: DisconnectContext,
) -> Result<()> {
    let disconnect = async_disconnect(svc, ctx.terminal());
    match tokio::time::timeout(TERMINAL_DISCONNECT_TIMEOUT, disconnect).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("DISCONNECT timed out");
            svc.cancel().await;
            Err(MqttError::OperationAborted)
        }
    }
}
