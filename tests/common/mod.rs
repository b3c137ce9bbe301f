//! Common test utilities: an in-memory stream and tracing setup

#![allow(dead_code)]

use bytes::Bytes;
use mqtt5_publish::client::Stream;
use mqtt5_publish::{FixedHeader, MqttError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};

/// Default timeout for waiting on the client
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Installs a fmt subscriber once; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mqtt5_publish=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct MockState {
    attempted: Mutex<Vec<Bytes>>,
    written: Mutex<Vec<Bytes>>,
    failures: Mutex<VecDeque<MqttError>>,
    closes: AtomicUsize,
    notify: Notify,
}

/// Stream that records packets instead of sending them
#[derive(Clone, Default)]
pub struct MockStream {
    state: Arc<MockState>,
}

fn split_packets(buf: &[u8]) -> Vec<Bytes> {
    let mut rest = Bytes::copy_from_slice(buf);
    let mut packets = Vec::new();
    while !rest.is_empty() {
        let mut probe = rest.clone();
        let header = FixedHeader::decode(&mut probe).expect("client wrote a broken packet");
        let len = header.encoded_len() + header.remaining_length as usize;
        packets.push(rest.split_to(len));
    }
    packets
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next_write(&self, error: MqttError) {
        self.state.failures.lock().await.push_back(error);
    }

    pub async fn attempted(&self) -> Vec<Bytes> {
        self.state.attempted.lock().await.clone()
    }

    pub async fn written(&self) -> Vec<Bytes> {
        self.state.written.lock().await.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub async fn wait_for_packets(&self, count: usize) -> Vec<Bytes> {
        tokio::time::timeout(DEFAULT_TIMEOUT, async {
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
        .unwrap_or_else(|_| panic!("timed out waiting for {count} packets"))
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

/// Stream whose writes block until the test opens the gate
///
/// Written packets are recorded by an inner [`MockStream`].
#[derive(Clone)]
pub struct GatedStream {
    inner: MockStream,
    gate: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl GatedStream {
    pub fn new() -> Self {
        Self {
            inner: MockStream::new(),
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Lets every pending and future write through
    pub fn open(&self) {
        self.gate.add_permits(1024);
    }

    pub fn recorder(&self) -> &MockStream {
        &self.inner
    }

    /// Waits until `count` writes have reached the gate
    pub async fn wait_for_writes(&self, count: usize) {
        tokio::time::timeout(DEFAULT_TIMEOUT, async {
            loop {
                let notified = self.notify.notified();
                if self.entered.load(Ordering::SeqCst) >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} writes"));
    }
}

impl Stream for GatedStream {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.gate
            .acquire()
            .await
            .map_err(|_| MqttError::OperationAborted)?
            .forget();
        self.inner.write(buf).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

/// First byte of a PUBLISH with the given flags
pub fn publish_header(flags: u8) -> u8 {
    mqtt5_publish::constants::fixed_header::PUBLISH_BASE | flags
}
