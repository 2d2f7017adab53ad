//! Frame transport over an opaque byte stream.
//!
//! The stream is split into a [`FrameReader`], owned by the connection
//! driver, and a [`FrameWriter`] shared by every task that sends. The writer
//! serialises access with one lock so that all frames of a command reach the
//! wire contiguously.

use std::{sync::Mutex, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    time::Instant,
};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    frame::{AmqpFrameCodec, Frame, FrameError, PROTOCOL_HEADER},
    metrics::{self, Direction},
    panic::lock,
};

/// Read half of the connection's byte stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of the connection's byte stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split a byte stream into frame reader and writer halves sharing `codec`.
pub fn split<S>(stream: S, codec: &AmqpFrameCodec) -> (FrameReader, FrameWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read, write) = tokio::io::split(stream);
    (
        FrameReader::new(Box::new(read), codec.clone()),
        FrameWriter::new(Box::new(write), codec.clone()),
    )
}

/// Reads frames, optionally bounded by a timeout.
pub struct FrameReader {
    inner: FramedRead<BoxedReader, AmqpFrameCodec>,
}

impl FrameReader {
    /// Wrap a byte stream.
    #[must_use]
    pub fn new(reader: BoxedReader, codec: AmqpFrameCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when `timeout` elapses first. Data buffered before
    /// the timeout is kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::EndOfStream`] when the peer closed the stream on
    /// a frame boundary, and other [`FrameError`]s for malformed input,
    /// truncated frames or I/O failures.
    pub async fn read_frame(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, FrameError> {
        let next = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            },
            None => self.inner.next().await,
        };
        match next {
            Some(Ok(frame)) => {
                metrics::inc_frames(Direction::Inbound);
                tracing::trace!(
                    channel = frame.channel(),
                    frame_type = ?frame.frame_type(),
                    len = frame.payload().len(),
                    "frame received"
                );
                Ok(Some(frame))
            }
            Some(Err(error)) => Err(error),
            None => Err(FrameError::EndOfStream),
        }
    }
}

/// Writes frames under one lock and records when the last write happened.
pub struct FrameWriter {
    inner: tokio::sync::Mutex<FramedWrite<BoxedWriter, AmqpFrameCodec>>,
    last_write: Mutex<Instant>,
}

impl FrameWriter {
    /// Wrap a byte stream.
    #[must_use]
    pub fn new(writer: BoxedWriter, codec: AmqpFrameCodec) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(FramedWrite::new(writer, codec)),
            last_write: Mutex::new(Instant::now()),
        }
    }

    /// Send the 8-octet protocol header that opens a connection.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if the stream fails.
    pub async fn send_header(&self) -> Result<(), FrameError> {
        let mut framed = self.inner.lock().await;
        let stream = framed.get_mut();
        stream.write_all(&PROTOCOL_HEADER).await?;
        stream.flush().await?;
        self.touch();
        Ok(())
    }

    /// Write `frames` contiguously and flush.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversized`] for a frame above the negotiated
    /// frame-max and [`FrameError::Io`] if the stream fails.
    pub async fn write_frames(&self, frames: Vec<Frame>) -> Result<(), FrameError> {
        let mut framed = self.inner.lock().await;
        for frame in frames {
            framed.feed(frame).await?;
            metrics::inc_frames(Direction::Outbound);
        }
        framed.flush().await?;
        self.touch();
        Ok(())
    }

    /// Write a single frame and flush.
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::write_frames`].
    pub async fn write_frame(&self, frame: Frame) -> Result<(), FrameError> {
        self.write_frames(vec![frame]).await
    }

    /// Flush and shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if the stream fails while closing.
    pub async fn shutdown(&self) -> Result<(), FrameError> {
        let mut framed = self.inner.lock().await;
        framed.close().await
    }

    /// When a frame or the protocol header was last written.
    #[must_use]
    pub fn last_write(&self) -> Instant { *lock(&self.last_write) }

    fn touch(&self) { *lock(&self.last_write) = Instant::now(); }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, duplex};

    use super::*;
    use crate::frame::FrameType;

    #[tokio::test]
    async fn header_and_frames_reach_the_peer() {
        let (client, mut server) = duplex(1024);
        let (_reader, writer) = split(client, &AmqpFrameCodec::new(0));
        writer.send_header().await.expect("header");
        writer
            .write_frames(vec![
                Frame::heartbeat(),
                Frame::new(FrameType::Body, 1, Bytes::from_static(b"hi")),
            ])
            .await
            .expect("frames");
        let mut received = vec![0; 8 + 8 + 10];
        server.read_exact(&mut received).await.expect("read");
        assert_eq!(&received[..8], b"AMQP\x00\x00\x09\x01");
        assert_eq!(&received[8..16], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
        assert_eq!(&received[16..], &[3, 0, 1, 0, 0, 0, 2, b'h', b'i', 0xCE]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_yields_none() {
        let (client, _server) = duplex(64);
        let (mut reader, _writer) = split(client, &AmqpFrameCodec::new(0));
        let frame = reader
            .read_frame(Some(Duration::from_millis(250)))
            .await
            .expect("no error");
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn clean_close_is_end_of_stream() {
        let (client, server) = duplex(64);
        drop(server);
        let (mut reader, _writer) = split(client, &AmqpFrameCodec::new(0));
        let err = reader.read_frame(None).await.expect_err("closed");
        assert!(matches!(err, FrameError::EndOfStream));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_advance_the_last_write_tick() {
        let (client, _server) = duplex(64);
        let (_reader, writer) = split(client, &AmqpFrameCodec::new(0));
        let before = writer.last_write();
        tokio::time::advance(Duration::from_secs(3)).await;
        writer.write_frame(Frame::heartbeat()).await.expect("write");
        assert!(writer.last_write() >= before + Duration::from_secs(3));
    }
}
