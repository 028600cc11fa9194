//! Adapters between frame-oriented transports and sequential byte I/O.
//!
//! A transport moves discrete [`Chunk`]s. Uploads arrive through a
//! [`ChunkSource`], which [`ChunkStreamReader`] turns into an [`AsyncRead`].
//! Downloads leave through a [`ChunkSink`], which [`ChunkStreamWriter`]
//! feeds with bounded frames.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::http::HeaderMap;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::SizeLimitExceeded;
use crate::headers::ResponseHeaders;

/// Largest payload a [`ChunkStreamWriter`] puts in one frame by default.
pub const MAX_CHUNK_SIZE: usize = 10 * 1024;

/// One frame of the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub content_type: String,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Chunk { data: data.into(), content_type: content_type.into() }
    }
}

/// Receive side of a frame transport. The stream ending is end-of-body.
pub trait ChunkSource: Stream<Item = io::Result<Chunk>> {
    /// Inbound request metadata, looked up case-insensitively.
    fn metadata(&self) -> &HeaderMap;
}

/// Send side of a frame transport.
///
/// A sink belongs to exactly one request; headers are sent once, before any
/// frame.
pub trait ChunkSink: Send {
    /// Inbound request metadata, looked up case-insensitively.
    fn metadata(&self) -> &HeaderMap;

    /// Commits the response headers.
    fn send_header(&mut self, headers: ResponseHeaders) -> impl Future<Output = io::Result<()>> + Send;

    /// Emits one body frame.
    fn send(&mut self, chunk: Chunk) -> impl Future<Output = io::Result<()>> + Send;
}

/// [`AsyncRead`] over a stream of chunks, with an optional cumulative cap.
///
/// A new frame is pulled only once the previous one is drained. With a
/// non-zero `size_limit`, the read that would push the running total past the
/// cap fails with [`SizeLimitExceeded`] before copying anything.
#[pin_project]
pub struct ChunkStreamReader<S> {
    #[pin]
    source: S,
    leftover: Bytes,
    size_limit: u64,
    total: u64,
}

impl<S> ChunkStreamReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_limit(source, 0)
    }

    /// `size_limit` of 0 means unlimited.
    pub fn with_limit(source: S, size_limit: u64) -> Self {
        ChunkStreamReader { source, leftover: Bytes::new(), size_limit, total: 0 }
    }

    /// Bytes handed out so far.
    pub fn total_read(&self) -> u64 {
        self.total
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }
}

impl<S: Stream<Item = io::Result<Chunk>>> AsyncRead for ChunkStreamReader<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();

        while this.leftover.is_empty() {
            match ready!(this.source.as_mut().poll_next(cx)) {
                None => return Poll::Ready(Ok(())),
                Some(Err(e)) => return Poll::Ready(Err(e)),
                Some(Ok(chunk)) => *this.leftover = chunk.data,
            }
        }

        let n = std::cmp::min(this.leftover.len(), buf.remaining());
        let n64 = n as u64;
        if *this.size_limit > 0 && this.total.saturating_add(n64) > *this.size_limit {
            tracing::debug!(limit = *this.size_limit, read = *this.total, "upload size limit exceeded");
            return Poll::Ready(Err(SizeLimitExceeded { limit: *this.size_limit }.into()));
        }

        buf.put_slice(&this.leftover.split_to(n));
        *this.total += n64;
        Poll::Ready(Ok(()))
    }
}

/// Splits sequential writes into frames no larger than the chunk size, all
/// tagged with one content type.
pub struct ChunkStreamWriter<'a, S> {
    sink: &'a mut S,
    content_type: String,
    chunk_size: usize,
}

impl<'a, S: ChunkSink> ChunkStreamWriter<'a, S> {
    pub fn new(sink: &'a mut S, content_type: impl Into<String>) -> Self {
        ChunkStreamWriter { sink, content_type: content_type.into(), chunk_size: MAX_CHUNK_SIZE }
    }

    /// Overrides the frame size bound. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sends `data` as one or more frames in order. On failure, frames sent
    /// before the error stay sent; the error is returned as-is.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_bytes(Bytes::copy_from_slice(data)).await
    }

    /// Like [`write`](Self::write) without copying the payload.
    pub async fn write_bytes(&mut self, mut data: Bytes) -> io::Result<usize> {
        let mut written = 0;
        while !data.is_empty() {
            let frame = data.split_to(std::cmp::min(data.len(), self.chunk_size));
            let len = frame.len();
            self.sink.send(Chunk { data: frame, content_type: self.content_type.clone() }).await?;
            written += len;
        }
        Ok(written)
    }

    /// Relays exactly `len` bytes from `stream`. Surplus bytes from the stream
    /// are dropped; a stream that ends early is an [`io::ErrorKind::UnexpectedEof`].
    pub async fn copy_stream<St>(&mut self, stream: St, len: u64) -> io::Result<u64>
    where
        St: Stream<Item = io::Result<Bytes>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut remaining = len;
        while remaining > 0 {
            let mut bytes = match stream.next().await {
                Some(item) => item?,
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("content ended {remaining} bytes short"),
                    ))
                }
            };
            if bytes.len() as u64 > remaining {
                bytes.truncate(remaining as usize);
            }
            remaining -= bytes.len() as u64;
            self.write_bytes(bytes).await?;
        }
        Ok(len)
    }
}
