//! The byte stream the client writes to and the source of inbound packets
//!
//! Both are seams: the client never opens connections itself. [`IoStream`] and
//! [`PacketReader`] adapt any tokio `AsyncWrite`/`AsyncRead` half.

use crate::constants::limits::MAX_VARIABLE_INT_BYTES;
use crate::constants::masks::CONTINUATION_BIT;
use crate::encoding::decode_variable_int;
use crate::error::{MqttError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Outbound half of a connection
pub trait Stream: Send + 'static {
    /// Writes the whole buffer
    ///
    /// # Errors
    ///
    /// `MqttError::TryAgain` signals that the connection is being replaced and every
    /// queued packet must be resent; `MqttError::NoRecovery` that it never will be.
    /// Any other error is a hard failure of this write.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Closes the connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be closed cleanly
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Inbound half of a connection, yielding one whole control packet at a time
pub trait PacketSource: Send + 'static {
    /// Reads the next complete packet, fixed header included
    ///
    /// Returns `Ok(None)` once the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the framing is malformed
    fn read_packet(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

/// [`Stream`] over any tokio writer
#[derive(Debug)]
pub struct IoStream<W> {
    writer: W,
}

impl<W> IoStream<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> Stream for IoStream<W> {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_all(buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// [`PacketSource`] that frames packets read from a tokio reader
#[derive(Debug)]
pub struct PacketReader<R> {
    reader: R,
}

impl<R> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> PacketSource for PacketReader<R> {
    async fn read_packet(&mut self) -> Result<Option<Bytes>> {
        let mut first = [0u8; 1];
        match self.reader.read_exact(&mut first).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut header = BytesMut::with_capacity(1 + MAX_VARIABLE_INT_BYTES);
        header.put_u8(first[0]);
        for _ in 0..MAX_VARIABLE_INT_BYTES {
            let byte = self.reader.read_u8().await?;
            header.put_u8(byte);
            if byte & CONTINUATION_BIT == 0 {
                break;
            }
        }

        let mut length_bytes = &header[1..];
        let remaining = decode_variable_int(&mut length_bytes)? as usize;
        if !length_bytes.is_empty() {
            return Err(MqttError::MalformedPacket(
                "Trailing bytes after remaining length".to_string(),
            ));
        }

        let mut packet = BytesMut::with_capacity(header.len() + remaining);
        packet.extend_from_slice(&header);
        packet.resize(header.len() + remaining, 0);
        self.reader.read_exact(&mut packet[header.len()..]).await?;

        tracing::trace!(
            packet_type = first[0] >> 4,
            remaining_length = remaining,
            "Read packet"
        );
        Ok(Some(packet.freeze()))
    }
}
