//! Write queue state shared by every operation of a client
//!
//! This module only decides *what* goes out next. The write loop in
//! [`ClientService`](super::ClientService) owns the stream and performs the writes.

use crate::constants::serial::SERIAL_BITS;
use crate::error::Result;
use bytes::Bytes;
use std::ops::BitOr;
use tokio::sync::oneshot;

/// Receive maximum meaning "no limit"
pub const MAX_LIMIT: u16 = crate::constants::defaults::RECEIVE_MAXIMUM;

/// How a write is scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendFlags(u8);

impl SendFlags {
    pub const NONE: Self = Self(0);
    /// Counts against the server's receive maximum
    pub const THROTTLED: Self = Self(0x01);
    /// Overtakes queued writes that are not prioritized
    pub const PRIORITIZED: Self = Self(0x02);
    /// Written alone, ahead of everything else
    pub const TERMINAL: Self = Self(0x04);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SendFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Wrap-around "less than" over the serial number space
#[must_use]
pub fn serial_less(s1: u32, s2: u32) -> bool {
    let half = 1u32 << (SERIAL_BITS - 1);
    if s1 < s2 {
        s2 - s1 < half
    } else {
        s1 - s2 >= half
    }
}

/// One queued write and the channel its result is reported on
#[derive(Debug)]
pub struct WriteReq {
    buffer: Bytes,
    serial: u32,
    flags: SendFlags,
    tx: oneshot::Sender<Result<()>>,
}

impl WriteReq {
    #[must_use]
    pub fn new(
        buffer: Bytes,
        serial: u32,
        flags: SendFlags,
    ) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                buffer,
                serial,
                flags,
                tx,
            },
            rx,
        )
    }

    #[must_use]
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    #[must_use]
    pub fn throttled(&self) -> bool {
        self.flags.contains(SendFlags::THROTTLED)
    }

    #[must_use]
    pub fn prioritized(&self) -> bool {
        self.flags.contains(SendFlags::PRIORITIZED)
    }

    #[must_use]
    pub fn terminal(&self) -> bool {
        self.flags.contains(SendFlags::TERMINAL)
    }

    /// Reports the outcome of the write to the operation that queued it
    pub fn complete(self, result: Result<()>) {
        let _ = self.tx.send(result);
    }

    fn sorts_before(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match (self.prioritized(), other.prioritized()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ if serial_less(self.serial, other.serial) => Ordering::Less,
            _ if serial_less(other.serial, self.serial) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

/// Queue, throttling quota and serial counter of the sender
#[derive(Debug)]
pub struct AsyncSender {
    queue: Vec<WriteReq>,
    write_in_progress: bool,
    resend_pending: bool,
    limit: u16,
    quota: u16,
    last_serial: u32,
}

impl Default for AsyncSender {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncSender {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            write_in_progress: false,
            resend_pending: false,
            limit: MAX_LIMIT,
            quota: MAX_LIMIT,
            last_serial: 0,
        }
    }

    /// Starts with the given receive maximum already applied
    #[must_use]
    pub fn with_limit(limit: u16) -> Self {
        Self {
            limit,
            quota: limit,
            ..Self::new()
        }
    }

    pub fn next_serial_num(&mut self) -> u32 {
        self.last_serial = self.last_serial.wrapping_add(1);
        self.last_serial
    }

    pub fn push(&mut self, req: WriteReq) {
        self.queue.push(req);
    }

    #[must_use]
    pub fn write_in_progress(&self) -> bool {
        self.write_in_progress
    }

    #[must_use]
    pub fn quota(&self) -> u16 {
        self.quota
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Picks the next batch and marks a write as in progress
    ///
    /// Returns `None` if a write is already running or nothing may be written. A terminal
    /// request goes out alone; with an unlimited receive maximum everything goes out;
    /// otherwise unthrottled requests go out together with as many throttled ones as the
    /// quota allows.
    pub fn begin_write(&mut self) -> Option<Vec<WriteReq>> {
        if self.write_in_progress || self.queue.is_empty() {
            return None;
        }

        self.queue.sort_by(WriteReq::sorts_before);

        let batch = if let Some(pos) = self.queue.iter().position(WriteReq::terminal) {
            vec![self.queue.remove(pos)]
        } else if self.limit == MAX_LIMIT {
            std::mem::take(&mut self.queue)
        } else {
            let mut batch = Vec::new();
            let mut held = Vec::new();
            for req in std::mem::take(&mut self.queue) {
                if !req.throttled() {
                    batch.push(req);
                } else if self.quota > 0 {
                    self.quota -= 1;
                    batch.push(req);
                } else {
                    held.push(req);
                }
            }
            self.queue = held;
            batch
        };

        if batch.is_empty() {
            return None;
        }
        self.write_in_progress = true;
        Some(batch)
    }

    pub fn end_write(&mut self) {
        self.write_in_progress = false;
    }

    /// Puts a batch whose write must be retried back in front of the queue
    pub fn requeue_front(&mut self, mut batch: Vec<WriteReq>) {
        batch.append(&mut self.queue);
        self.queue = batch;
    }

    /// Resets throttling to `limit` and drains the queue for a resend
    ///
    /// Returns `None` while a write is in progress and marks the resend as pending; the
    /// writer picks it up through [`take_resend_pending`](Self::take_resend_pending) once
    /// that write ends. The caller resolves unanswered replies and completes the drained
    /// requests with `MqttError::TryAgain`.
    pub fn take_for_resend(&mut self, limit: u16) -> Option<Vec<WriteReq>> {
        if self.write_in_progress {
            self.resend_pending = true;
            return None;
        }
        self.resend_pending = false;
        self.limit = limit;
        self.quota = limit;
        Some(std::mem::take(&mut self.queue))
    }

    /// Whether a resend was refused during the last write, clearing the mark
    pub fn take_resend_pending(&mut self) -> bool {
        std::mem::take(&mut self.resend_pending)
    }

    /// Drains the queue so every request can be completed with `OperationAborted`
    pub fn cancel(&mut self) -> Vec<WriteReq> {
        std::mem::take(&mut self.queue)
    }

    /// Returns one unit of quota after a throttled exchange finished
    ///
    /// Returns `false` when throttling is off and there is nothing to resume.
    pub fn throttled_op_done(&mut self) -> bool {
        if self.limit == MAX_LIMIT {
            return false;
        }
        self.quota = self.quota.saturating_add(1).min(self.limit);
        true
    }
}
