//! Registry of operations waiting for an acknowledgment
//!
//! A waiter is keyed by the acknowledgment's packet type and packet identifier and
//! receives the acknowledgment body (everything after the fixed header).

use crate::constants::defaults::MAX_REPLY_TIME;
use crate::error::{MqttError, Result};
use crate::packet::PacketType;
use bytes::Bytes;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

#[derive(Debug)]
struct ReplyHandler {
    code: PacketType,
    packet_id: u16,
    tx: oneshot::Sender<Result<Bytes>>,
    registered_at: Instant,
}

impl ReplyHandler {
    fn complete(self, result: Result<Bytes>) {
        // the waiter may have given up already
        let _ = self.tx.send(result);
    }

    fn matches(&self, code: PacketType, packet_id: u16) -> bool {
        self.code == code && self.packet_id == packet_id
    }
}

/// An acknowledgment that arrived before anyone waited for it
#[derive(Debug)]
struct FastReply {
    code: PacketType,
    packet_id: u16,
    body: Bytes,
}

#[derive(Debug, Default)]
struct Inner {
    handlers: Vec<ReplyHandler>,
    fast_replies: Vec<FastReply>,
}

impl Inner {
    fn prune_abandoned(&mut self) {
        self.handlers.retain(|h| !h.tx.is_closed());
    }
}

/// Pending wait for one acknowledgment
#[derive(Debug)]
pub struct ReplyWaiter {
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl ReplyWaiter {
    /// Waits for the acknowledgment body
    ///
    /// # Errors
    ///
    /// - `MqttError::TryAgain` if the connection was replaced before the reply arrived
    /// - `MqttError::OperationAborted` if the wait was cancelled or superseded
    pub async fn wait(self) -> Result<Bytes> {
        self.rx.await?
    }
}

#[derive(Debug, Default)]
pub struct Replies {
    inner: Mutex<Inner>,
}

impl Replies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the `code` acknowledgment of `packet_id`
    ///
    /// An earlier waiter for the same pair is aborted. A matching fast reply resolves the
    /// new waiter immediately.
    pub async fn register(&self, code: PacketType, packet_id: u16) -> ReplyWaiter {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().await;
        inner.prune_abandoned();

        if let Some(pos) = inner.handlers.iter().position(|h| h.matches(code, packet_id)) {
            tracing::debug!(?code, packet_id, "Replacing duplicate reply waiter");
            inner
                .handlers
                .swap_remove(pos)
                .complete(Err(MqttError::OperationAborted));
        }

        if let Some(pos) = inner
            .fast_replies
            .iter()
            .position(|f| f.code == code && f.packet_id == packet_id)
        {
            let fast = inner.fast_replies.remove(pos);
            let _ = tx.send(Ok(fast.body));
            return ReplyWaiter { rx };
        }

        inner.handlers.push(ReplyHandler {
            code,
            packet_id,
            tx,
            registered_at: Instant::now(),
        });
        ReplyWaiter { rx }
    }

    /// Hands an inbound acknowledgment to its waiter
    ///
    /// Returns `false` if nobody was waiting, in which case the body is kept as a fast
    /// reply until the next write.
    pub async fn dispatch(&self, code: PacketType, packet_id: u16, body: Bytes) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.handlers.iter().position(|h| h.matches(code, packet_id)) {
            Some(pos) => {
                inner.handlers.remove(pos).complete(Ok(body));
                true
            }
            None => {
                tracing::trace!(?code, packet_id, "Buffering fast reply");
                inner.fast_replies.push(FastReply {
                    code,
                    packet_id,
                    body,
                });
                false
            }
        }
    }

    /// Resolves every waiter with `MqttError::TryAgain`
    pub async fn resend_unanswered(&self) {
        let handlers = std::mem::take(&mut self.inner.lock().await.handlers);
        for handler in handlers {
            handler.complete(Err(MqttError::TryAgain));
        }
    }

    /// Resolves every waiter with `MqttError::OperationAborted`
    pub async fn cancel_unanswered(&self) {
        let handlers = std::mem::take(&mut self.inner.lock().await.handlers);
        for handler in handlers {
            handler.complete(Err(MqttError::OperationAborted));
        }
    }

    /// Whether any live waiter has been waiting longer than the reply time limit
    pub async fn any_expired(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.prune_abandoned();
        let now = Instant::now();
        inner
            .handlers
            .iter()
            .any(|h| now.duration_since(h.registered_at) > MAX_REPLY_TIME)
    }

    pub async fn clear_fast_replies(&self) {
        self.inner.lock().await.fast_replies.clear();
    }

    /// Aborts every waiter for a PUBREL
    pub async fn clear_pending_pubrels(&self) {
        let mut inner = self.inner.lock().await;
        let (pubrels, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.handlers)
            .into_iter()
            .partition(|h| h.code == PacketType::PubRel);
        inner.handlers = rest;
        drop(inner);

        for handler in pubrels {
            handler.complete(Err(MqttError::OperationAborted));
        }
    }

    /// Number of registered waiters that are still being awaited
    pub async fn pending(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.prune_abandoned();
        inner.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispatch_resolves_matching_waiter() {
        let replies = Replies::new();
        let waiter = replies.register(PacketType::PubAck, 7).await;

        assert!(replies.dispatch(PacketType::PubAck, 7, Bytes::from_static(&[0, 7])).await);
        assert_eq!(&waiter.wait().await.unwrap()[..], &[0, 7]);
        assert_eq!(replies.pending().await, 0);
    }

    #[tokio::test]
    async fn test_key_includes_packet_type() {
        let replies = Replies::new();
        let rec = replies.register(PacketType::PubRec, 1).await;
        let comp = replies.register(PacketType::PubComp, 1).await;

        replies.dispatch(PacketType::PubComp, 1, Bytes::new()).await;
        assert!(comp.wait().await.is_ok());
        assert_eq!(replies.pending().await, 1);

        replies.cancel_unanswered().await;
        assert_eq!(rec.wait().await, Err(MqttError::OperationAborted));
    }

    #[tokio::test]
    async fn test_fast_reply_served_to_next_registration() {
        let replies = Replies::new();
        assert!(!replies.dispatch(PacketType::PubAck, 3, Bytes::from_static(b"x")).await);

        let waiter = replies.register(PacketType::PubAck, 3).await;
        assert_eq!(&waiter.wait().await.unwrap()[..], b"x");
        assert_eq!(replies.pending().await, 0);
    }

    #[tokio::test]
    async fn test_clear_fast_replies() {
        let replies = Replies::new();
        replies.dispatch(PacketType::PubAck, 3, Bytes::new()).await;
        replies.clear_fast_replies().await;

        let waiter = replies.register(PacketType::PubAck, 3).await;
        replies.resend_unanswered().await;
        assert_eq!(waiter.wait().await, Err(MqttError::TryAgain));
    }

    #[tokio::test]
    async fn test_duplicate_registration_aborts_older_waiter() {
        let replies = Replies::new();
        let first = replies.register(PacketType::PubAck, 9).await;
        let second = replies.register(PacketType::PubAck, 9).await;

        assert_eq!(first.wait().await, Err(MqttError::OperationAborted));
        replies.dispatch(PacketType::PubAck, 9, Bytes::new()).await;
        assert!(second.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_pending_pubrels_only() {
        let replies = Replies::new();
        let pubrel = replies.register(PacketType::PubRel, 1).await;
        let _puback = replies.register(PacketType::PubAck, 2).await;

        replies.clear_pending_pubrels().await;
        assert_eq!(pubrel.wait().await, Err(MqttError::OperationAborted));
        assert_eq!(replies.pending().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_pruned() {
        let replies = Replies::new();
        drop(replies.register(PacketType::PubAck, 1).await);
        assert_eq!(replies.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_expired_after_reply_time() {
        let replies = Replies::new();
        let _waiter = replies.register(PacketType::PubAck, 1).await;
        assert!(!replies.any_expired().await);

        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(!replies.any_expired().await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(replies.any_expired().await);
    }
}
