//! In-memory transports and bodies shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::chunk::{Chunk, ChunkSink, ChunkSource};
use crate::headers::ResponseHeaders;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
    });
}

/// Records what a download writes. Panics if headers are committed twice.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub metadata: HeaderMap,
    pub headers: Option<ResponseHeaders>,
    pub chunks: Vec<Chunk>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn with_request(request: &[(&'static str, &'static str)]) -> Self {
        let mut sink = RecordingSink::default();
        for &(name, value) in request {
            sink.set_request_header(name, value);
        }
        sink
    }

    pub fn set_request_header(&mut self, name: &'static str, value: &str) {
        self.metadata.insert(HeaderName::from_static(name), HeaderValue::from_bytes(value.as_bytes()).unwrap());
    }

    /// Frame sends fail with `BrokenPipe` once `n` have succeeded.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.headers.as_ref().and_then(ResponseHeaders::status)
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.as_ref().and_then(|h| h.get(name))
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.data.iter().copied()).collect()
    }
}

impl ChunkSink for RecordingSink {
    fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    async fn send_header(&mut self, headers: ResponseHeaders) -> io::Result<()> {
        assert!(self.headers.is_none(), "headers committed twice");
        self.headers = Some(headers);
        Ok(())
    }

    async fn send(&mut self, chunk: Chunk) -> io::Result<()> {
        if self.fail_after.is_some_and(|n| self.chunks.len() >= n) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
        }
        self.chunks.push(chunk);
        Ok(())
    }
}

/// Upload side: replays frames, then optionally fails.
pub struct ScriptedSource {
    chunks: VecDeque<Chunk>,
    error: Option<io::Error>,
    metadata: HeaderMap,
}

impl ScriptedSource {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        ScriptedSource { chunks: chunks.into(), error: None, metadata: HeaderMap::new() }
    }

    /// Splits `body` into frames of `frame_size` under the given request content type.
    pub fn upload(body: &[u8], frame_size: usize, content_type: &str) -> Self {
        let chunks = body
            .chunks(frame_size)
            .map(|frame| Chunk::new(frame.to_vec(), "application/octet-stream"))
            .collect();
        ScriptedSource::new(chunks).with_content_type(content_type)
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.metadata.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        self
    }

    pub fn then_fail(mut self, error: io::Error) -> Self {
        self.error = Some(error);
        self
    }
}

impl Stream for ScriptedSource {
    type Item = io::Result<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        Poll::Ready(self.error.take().map(Err))
    }
}

impl ChunkSource for ScriptedSource {
    fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }
}

/// Readable content that refuses every seek.
pub struct Unseekable(Cursor<&'static [u8]>);

impl Unseekable {
    pub fn new(data: &'static [u8]) -> Self {
        Unseekable(Cursor::new(data))
    }
}

impl AsyncRead for Unseekable {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncSeek for Unseekable {
    fn start_seek(self: Pin<&mut Self>, _position: io::SeekFrom) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no seeking"))
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(0))
    }
}
