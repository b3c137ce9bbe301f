//! Shared state of one client connection
//!
//! Every publish holds an `Arc` of the service for as long as it runs. The service owns
//! the stream, the packet identifier pool, the reply registry, the sender queue and the
//! limits negotiated in CONNACK.

use crate::client::cancel::CancellationToken;
use crate::client::disconnect::{terminal_disconnect, DisconnectContext};
use crate::client::publish::{PublishSendOp, QosPolicy};
use crate::client::replies::{ReplyWaiter, Replies};
use crate::client::sender::{AsyncSender, SendFlags, WriteReq};
use crate::client::stream::Stream;
use crate::error::{MqttError, Result};
use crate::packet::{DisconnectPacket, FixedHeader, MqttPacket, PacketType};
use crate::packet_id::PacketIdAllocator;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::{ConnackProperties, DisconnectProperties, PublishOptions};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct ClientService<S: Stream> {
    stream: Mutex<S>,
    pids: Mutex<PacketIdAllocator>,
    replies: Replies,
    sender: Mutex<AsyncSender>,
    connack: RwLock<ConnackProperties>,
    cancelled: AtomicBool,
    // fired by cancel() to abort a write stuck in the stream
    abort: CancellationToken,
}

impl<S: Stream> std::fmt::Debug for ClientService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientService")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S: Stream> ClientService<S> {
    /// Creates a service for a server that advertised no limits
    pub fn new(stream: S) -> Arc<Self> {
        Self::with_connack_properties(stream, ConnackProperties::default())
    }

    pub fn with_connack_properties(stream: S, connack: ConnackProperties) -> Arc<Self> {
        Arc::new(Self {
            stream: Mutex::new(stream),
            pids: Mutex::new(PacketIdAllocator::new()),
            replies: Replies::new(),
            sender: Mutex::new(AsyncSender::with_limit(connack.receive_maximum())),
            connack: RwLock::new(connack),
            cancelled: AtomicBool::new(false),
            abort: CancellationToken::new(),
        })
    }

    /// Publishes `payload` to `topic` with the QoS of `Q`
    ///
    /// QoS 0 resolves to `()`; QoS 1 and 2 resolve to the [`PublishAck`](crate::PublishAck)
    /// of the final acknowledgment. A server rejection is reported through its reason
    /// code, not as an error.
    ///
    /// # Errors
    ///
    /// - Local validation errors, before anything is written
    /// - `MqttError::PacketIdExhausted` if every packet identifier is in use
    /// - `MqttError::PacketTooLarge` if the packet exceeds the server's maximum packet size
    /// - `MqttError::OperationAborted` if the client is cancelled
    /// - Any hard error reported by the stream
    pub async fn publish<Q: QosPolicy>(
        self: &Arc<Self>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<Q::Outcome> {
        PublishSendOp::perform::<Q>(Arc::clone(self), topic.into(), payload.into(), options).await
    }

    /// Like [`publish`](Self::publish), cancelling the whole client once `token` fires
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish)
    pub async fn publish_with_cancellation<Q: QosPolicy>(
        self: &Arc<Self>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        options: PublishOptions,
        token: &CancellationToken,
    ) -> Result<Q::Outcome> {
        if token.is_cancelled() {
            self.cancel().await;
            return Err(MqttError::OperationAborted);
        }

        let svc = Arc::clone(self);
        let watched = token.clone();
        let watcher = tokio::spawn(async move {
            watched.cancelled().await;
            tracing::debug!("Publish cancelled by caller");
            svc.cancel().await;
        });

        let result = self.publish::<Q>(topic, payload, options).await;
        watcher.abort();
        result
    }

    /// Sends a DISCONNECT and cancels the client
    ///
    /// # Errors
    ///
    /// Returns an error if the properties are invalid or the packet could not be written
    pub async fn disconnect(
        self: &Arc<Self>,
        reason_code: ReasonCode,
        properties: DisconnectProperties,
    ) -> Result<()> {
        terminal_disconnect(self, DisconnectContext::new(reason_code, properties)).await
    }

    /// Takes the lowest free packet identifier, or 0 when none is left
    pub async fn allocate_pid(&self) -> u16 {
        self.pids.lock().await.allocate()
    }

    /// Returns `packet_id` to the pool
    ///
    /// `was_throttled` gives back the unit of send quota the exchange held, which may let
    /// a queued publish go out.
    pub async fn free_pid(self: &Arc<Self>, packet_id: u16, was_throttled: bool) {
        self.pids.lock().await.free(packet_id);
        if was_throttled && self.sender.lock().await.throttled_op_done() {
            self.do_write().await;
        }
    }

    pub async fn packet_ids_in_use(&self) -> usize {
        self.pids.lock().await.in_use()
    }

    /// Number of writes waiting in the sender queue
    pub async fn queued_writes(&self) -> usize {
        self.sender.lock().await.queued()
    }

    pub async fn next_serial_num(&self) -> u32 {
        self.sender.lock().await.next_serial_num()
    }

    /// Queues `buffer` for writing and waits until it has been written
    ///
    /// # Errors
    ///
    /// - `MqttError::TryAgain` if the connection was replaced; the caller decides whether
    ///   to resend
    /// - `MqttError::OperationAborted` if the client is or becomes cancelled
    /// - The stream's error for a failed write
    pub async fn async_send(
        self: &Arc<Self>,
        buffer: Bytes,
        serial: u32,
        flags: SendFlags,
    ) -> Result<()> {
        let rx = {
            let mut sender = self.sender.lock().await;
            if self.is_cancelled() {
                return Err(MqttError::OperationAborted);
            }
            let (req, rx) = WriteReq::new(buffer, serial, flags);
            sender.push(req);
            rx
        };
        self.do_write().await;
        rx.await?
    }

    /// Registers interest in the `code` acknowledgment of `packet_id`
    ///
    /// Call before sending the packet being acknowledged, then await the waiter.
    pub async fn register_reply(&self, code: PacketType, packet_id: u16) -> ReplyWaiter {
        let waiter = self.replies.register(code, packet_id).await;
        if self.is_cancelled() {
            self.replies.cancel_unanswered().await;
        }
        waiter
    }

    /// Waits for the body of the `code` acknowledgment of `packet_id`
    ///
    /// # Errors
    ///
    /// Same as [`ReplyWaiter::wait`]
    pub async fn async_wait_reply(&self, code: PacketType, packet_id: u16) -> Result<Bytes> {
        self.register_reply(code, packet_id).await.wait().await
    }

    pub async fn connack_properties(&self) -> ConnackProperties {
        self.connack.read().await.clone()
    }

    pub async fn set_connack_properties(&self, connack: ConnackProperties) {
        *self.connack.write().await = connack;
    }

    /// Switches to a new connection and resends everything unacknowledged
    ///
    /// Without a session on the server, pending PUBREL exchanges cannot continue and are
    /// aborted.
    pub async fn on_reconnect(
        self: &Arc<Self>,
        stream: S,
        connack: ConnackProperties,
        session_present: bool,
    ) {
        tracing::debug!(session_present, "Connection replaced");
        *self.stream.lock().await = stream;
        self.set_connack_properties(connack).await;
        if !session_present {
            self.replies.clear_pending_pubrels().await;
        }
        self.resend().await;
    }

    /// Completes queued writes and unanswered waits with `MqttError::TryAgain`
    ///
    /// While a write is in progress the resend is deferred until that write ends.
    pub async fn resend(self: &Arc<Self>) {
        self.resend_queued().await;
        self.do_write().await;
    }

    async fn resend_queued(&self) {
        let limit = self.connack.read().await.receive_maximum();
        let Some(drained) = self.sender.lock().await.take_for_resend(limit) else {
            return;
        };
        self.complete_for_resend(drained).await;
    }

    async fn complete_for_resend(&self, drained: Vec<WriteReq>) {
        self.replies.resend_unanswered().await;
        for req in drained {
            req.complete(Err(MqttError::TryAgain));
        }
    }

    /// Whether a reply has been outstanding for longer than the reply time limit
    pub async fn any_reply_expired(&self) -> bool {
        self.replies.any_expired().await
    }

    /// Routes one complete inbound packet, fixed header included
    ///
    /// Publish acknowledgments go to the operation waiting for them. Other packets are
    /// logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet is malformed
    pub async fn dispatch_packet(&self, mut packet: Bytes) -> Result<()> {
        let header = FixedHeader::decode(&mut packet)?;
        if packet.len() != header.remaining_length as usize {
            return Err(MqttError::MalformedPacket(format!(
                "Remaining length {} does not match {} body bytes",
                header.remaining_length,
                packet.len()
            )));
        }
        if !header.validate_flags() {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid flags 0x{:02X} for {:?}",
                header.flags, header.packet_type
            )));
        }

        match header.packet_type {
            code if code.is_publish_ack() => {
                if packet.len() < 2 {
                    return Err(MqttError::MalformedPacket(format!(
                        "{code:?} missing packet identifier"
                    )));
                }
                let packet_id = u16::from_be_bytes([packet[0], packet[1]]);
                tracing::trace!(?code, packet_id, "Dispatching acknowledgment");
                self.replies.dispatch(code, packet_id, packet).await;
            }
            PacketType::Disconnect => {
                let disconnect = DisconnectPacket::decode_body(&mut packet, &header)?;
                tracing::warn!(
                    reason_code = %disconnect.reason_code,
                    reason = ?disconnect.properties.reason_string,
                    "Server sent DISCONNECT"
                );
            }
            other => tracing::debug!(packet_type = ?other, "Ignoring inbound packet"),
        }
        Ok(())
    }

    /// Cancels the whole client
    ///
    /// Queued writes, the write in progress and unanswered waits complete with
    /// `MqttError::OperationAborted` and the stream is closed. Every later send fails the
    /// same way.
    pub async fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Cancelling client");
        self.abort.cancel();

        let queued = self.sender.lock().await.cancel();
        for req in queued {
            req.complete(Err(MqttError::OperationAborted));
        }
        self.replies.cancel_unanswered().await;
        self.shutdown().await;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Closes the stream without cancelling the client
    ///
    /// Waits for a write in progress to end; after [`cancel`](Self::cancel) that write has
    /// already been abandoned.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stream.lock().await.close().await {
            tracing::debug!(error = %e, "Error closing stream");
        }
    }

    async fn do_write(self: &Arc<Self>) {
        let batch = self.sender.lock().await.begin_write();
        if let Some(batch) = batch {
            let svc = Arc::clone(self);
            tokio::spawn(async move { svc.write_loop(batch).await });
        }
    }

    /// Writes batches until the queue has nothing more that may go out
    async fn write_loop(self: Arc<Self>, mut batch: Vec<WriteReq>) {
        loop {
            self.replies.clear_fast_replies().await;

            let mut buf = BytesMut::with_capacity(batch.iter().map(|r| r.buffer().len()).sum());
            for req in &batch {
                buf.extend_from_slice(req.buffer());
            }
            tracing::trace!(packets = batch.len(), bytes = buf.len(), "Writing batch");
            let write = async { self.stream.lock().await.write(&buf).await };
            let result = tokio::select! {
                biased;
                () = self.abort.cancelled() => Err(MqttError::OperationAborted),
                result = write => result,
            };

            let mut sender = self.sender.lock().await;
            sender.end_write();
            match result {
                Err(MqttError::TryAgain) => {
                    tracing::debug!(packets = batch.len(), "Write interrupted, resending");
                    sender.requeue_front(batch);
                    let limit = self.connack.read().await.receive_maximum();
                    let drained = sender.take_for_resend(limit).unwrap_or_default();
                    drop(sender);
                    self.complete_for_resend(drained).await;
                    sender = self.sender.lock().await;
                }
                Err(MqttError::NoRecovery) => {
                    drop(sender);
                    tracing::error!("Connection lost for good");
                    self.cancel().await;
                    for req in batch {
                        req.complete(Err(MqttError::NoRecovery));
                    }
                    return;
                }
                Err(MqttError::OperationAborted) => {
                    for req in batch {
                        req.complete(Err(MqttError::OperationAborted));
                    }
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Write failed");
                    for req in batch {
                        req.complete(Err(e.clone()));
                    }
                }
                Ok(()) => {
                    for req in batch {
                        req.complete(Ok(()));
                    }
                }
            }

            if sender.take_resend_pending() {
                tracing::debug!("Connection replaced during write, resending");
                let limit = self.connack.read().await.receive_maximum();
                let drained = sender.take_for_resend(limit).unwrap_or_default();
                drop(sender);
                self.complete_for_resend(drained).await;
                sender = self.sender.lock().await;
            }

            match sender.begin_write() {
                Some(next) => batch = next,
                None => return,
            }
        }
    }
}
