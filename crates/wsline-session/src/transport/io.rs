//! Byte-stream seam between the session and whatever carries the bytes.
//!
//! The session only needs ordered, reliable delivery: chunks in, buffers out,
//! and a single close. "Read exactly N" and "read until delimiter" are served
//! by the buffered decoders, which report "need more input" until satisfied.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use wsline_core::error::Result;

/// Inbound half. Owned by the session's reader task.
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// Next chunk of bytes, `None` once the peer closed its side.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Outbound half. Owned by the session actor.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    /// Write and flush the whole buffer.
    async fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Release the connection. Called at most once per session.
    async fn close(&mut self) -> Result<()>;
}

/// A post-handshake connection that can be split into its two halves.
pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn into_split(self, read_chunk_bytes: usize) -> (Self::Reader, Self::Writer);
}

/// Adapter for any tokio byte stream (`TcpStream`, TLS streams, `DuplexStream`).
pub struct IoTransport<T> {
    io: T,
}

impl<T> IoTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(io: T) -> Self {
        Self { io }
    }
}

impl<T> Transport for IoTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    type Reader = IoReader<T>;
    type Writer = IoWriter<T>;

    fn into_split(self, read_chunk_bytes: usize) -> (Self::Reader, Self::Writer) {
        let (r, w) = tokio::io::split(self.io);
        (
            IoReader {
                inner: r,
                buf: BytesMut::with_capacity(read_chunk_bytes),
                chunk: read_chunk_bytes,
            },
            IoWriter { inner: w },
        )
    }
}

pub struct IoReader<T> {
    inner: ReadHalf<T>,
    buf: BytesMut,
    chunk: usize,
}

#[async_trait]
impl<T> TransportReader for IoReader<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        self.buf.reserve(self.chunk);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

pub struct IoWriter<T> {
    inner: WriteHalf<T>,
}

#[async_trait]
impl<T> TransportWriter for IoWriter<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
