//! Test utilities for the publish path

use crate::client::Stream;
use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Default)]
struct MockState {
    attempted: Mutex<Vec<Bytes>>,
    written: Mutex<Vec<Bytes>>,
    failures: Mutex<VecDeque<MqttError>>,
    closes: AtomicUsize,
    notify: Notify,
}

/// In-memory [`Stream`] recording every packet written to it
///
/// Clones share the recording, so a test keeps one handle while the service owns
/// another. Writes are split back into individual packets.
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    state: Arc<MockState>,
}

/// Splits a write into the packets it carries
pub fn split_packets(buf: &[u8]) -> Vec<Bytes> {
    let mut rest = Bytes::copy_from_slice(buf);
    let mut packets = Vec::new();
    while !rest.is_empty() {
        let mut probe = rest.clone();
        let header = FixedHeader::decode(&mut probe).unwrap();
        let len = header.encoded_len() + header.remaining_length as usize;
        packets.push(rest.split_to(len));
    }
    packets
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next write fail with `error` without recording it as written
    pub async fn fail_next_write(&self, error: MqttError) {
        self.state.failures.lock().await.push_back(error);
    }

    /// Every packet handed to the stream, including those of failed writes
    pub async fn attempted(&self) -> Vec<Bytes> {
        self.state.attempted.lock().await.clone()
    }

    /// Packets of successful writes
    pub async fn written(&self) -> Vec<Bytes> {
        self.state.written.lock().await.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` packets were written successfully
    pub async fn wait_for_packets(&self, count: usize) -> Vec<Bytes> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.state.notify.notified();
                let written = self.written().await;
                if written.len() >= count {
                    return written;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for packets")
    }
}

impl Stream for MockStream {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        let packets = split_packets(buf);
        self.state.attempted.lock().await.extend(packets.iter().cloned());

        if let Some(error) = self.state.failures.lock().await.pop_front() {
            return Err(error);
        }

        self.state.written.lock().await.extend(packets);
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_packets() {
        let packets = split_packets(&[0x40, 0x02, 0x00, 0x01, 0xE0, 0x00]);
        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[1][..], &[0xE0, 0x00]);
    }
}
