//! Dedicated writer task for one channel.
//!
//! Every producer on a channel (correlator, batch flush, emitters running in
//! group tasks) sends frames through a bounded mpsc queue to a single task
//! that owns the socket's write half:
//!
//! ```text
//! Correlator ─┐
//! Emitter 1  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► socket
//! Emitter N  ─┘
//! ```
//!
//! Frames queued back-to-back are written with one `write_vectored` call.
//! Once the task stops (socket error or every handle dropped), sends fail
//! with [`Error::ChannelClosed`].

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Header, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE};

/// Default queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (11 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for EOT).
    pub payload: Bytes,
}

impl OutboundFrame {
    #[inline]
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Capacity of the frame queue.
    pub channel_capacity: usize,
    /// Frames with larger payloads are refused.
    pub max_message_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Handle for sending frames to the writer task. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    max_message_size: usize,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Waits while the queue is full. Fails if the payload is too large or
    /// the writer task has stopped.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if frame.payload.len() > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size: frame.payload.len(),
                max: self.max_message_size,
            });
        }
        self.tx.send(frame).await.map_err(|_| Error::ChannelClosed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The returned `JoinHandle` resolves once every handle is dropped and the
/// queue is drained, or when a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let handle = WriterHandle {
        tx,
        max_message_size: config.max_message_size,
    };
    let task = tokio::spawn(writer_loop(rx, writer));
    (handle, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            warn!(error = %e, "channel write failed, dropping {} queued frame(s)", batch.len());
            rx.close();
            return Err(e);
        }
        batch.clear();
    }

    debug!("writer queue closed, shutting down write half");
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch with `write_vectored`, resuming after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut skipped = 0;

    for frame in batch {
        let header_start = skipped;
        let header_end = skipped + HEADER_SIZE;

        if skip_bytes < header_end {
            let start_in_header = skip_bytes.saturating_sub(header_start);
            slices.push(IoSlice::new(&frame.header[start_in_header..]));
        }
        skipped = header_end;

        if !frame.payload.is_empty() {
            let payload_start = skipped;
            let payload_end = skipped + frame.payload.len();

            if skip_bytes < payload_end {
                let start_in_payload = skip_bytes.saturating_sub(payload_start);
                slices.push(IoSlice::new(&frame.payload[start_in_payload..]));
            }
            skipped = payload_end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(request_id: u32, payload: &'static [u8]) -> OutboundFrame {
        let header = Header::new(2, flags::RESPONSE, request_id, payload.len() as u32);
        OutboundFrame::new(&header, Bytes::from_static(payload))
    }

    #[tokio::test]
    async fn test_frames_arrive_in_send_order() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        for i in 0..10u32 {
            handle.send(frame(i, b"abcd")).await.unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();

        assert_eq!(bytes.len(), 10 * (HEADER_SIZE + 4));
        for i in 0..10usize {
            let at = i * (HEADER_SIZE + 4);
            let header = Header::decode(&bytes[at..]).unwrap();
            assert_eq!(header.request_id, i as u32);
        }
    }

    #[tokio::test]
    async fn test_oversize_frame_refused() {
        let (client, _server) = duplex(4096);
        let config = WriterConfig {
            max_message_size: 2,
            ..Default::default()
        };
        let (handle, _task) = spawn_writer_task(client, config);

        let err = handle.send(frame(1, b"abcd")).await.unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { size: 4, max: 2 }));
    }

    #[tokio::test]
    async fn test_send_after_peer_gone_fails_loudly() {
        let (client, server) = duplex(64);
        drop(server);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        // first write hits the broken pipe and stops the task
        let _ = handle.send(frame(1, b"abcd")).await;
        assert!(task.await.unwrap().is_err());

        let err = handle.send(frame(2, b"abcd")).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        assert!(handle.is_closed());
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = vec![frame(42, b"hello")];

        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 5);
        assert_eq!(slices[1].len(), 5);

        let slices = build_remaining_slices(&batch, HEADER_SIZE);
        assert_eq!(slices.len(), 1);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|i| frame(i, b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), 5 * (HEADER_SIZE + 3));
    }
}
