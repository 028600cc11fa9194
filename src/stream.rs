use std::{io, mem};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project::pin_project;
use rand::Rng;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{AsyncSeekStart, ByteRange};

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Yields exactly `length` bytes read from the body's current position.
///
/// A body that runs dry early yields [`io::ErrorKind::UnexpectedEof`], since
/// the length was already promised to the peer.
#[pin_project]
pub struct RangedStream<B> {
    buffer: BytesMut,
    remaining: u64,
    #[pin]
    body: B,
}

impl<B: AsyncRead> RangedStream<B> {
    pub fn new(body: B, length: u64) -> Self {
        RangedStream { buffer: allocate_buffer(), remaining: length, body }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<B: AsyncRead> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.project();
        poll_read_chunk(this.body, cx, this.buffer, this.remaining)
    }
}

/// One read of at most `remaining` bytes into `buffer`, handing the filled
/// buffer out and replacing it.
fn poll_read_chunk<B: AsyncRead>(
    body: Pin<&mut B>,
    cx: &mut Context<'_>,
    buffer: &mut BytesMut,
    remaining: &mut u64,
) -> Poll<Option<io::Result<Bytes>>> {
    if *remaining == 0 {
        return Poll::Ready(None);
    }

    let uninit = buffer.spare_capacity_mut();
    let nbytes = std::cmp::min(uninit.len(), usize::try_from(*remaining).unwrap_or(usize::MAX));
    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

    if let Err(e) = ready!(body.poll_read(cx, &mut read_buf)) {
        return Poll::Ready(Some(Err(e)));
    }
    let n = read_buf.filled().len();
    if n == 0 {
        return Poll::Ready(Some(Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("body ended with {remaining} bytes outstanding"),
        ))));
    }

    // SAFETY: poll_read has initialized `n` more bytes past `buffer.len()`
    unsafe { buffer.set_len(buffer.len() + n); }
    let chunk = mem::replace(buffer, allocate_buffer());

    // n <= remaining by the min above
    *remaining -= n as u64;
    Poll::Ready(Some(Ok(chunk.freeze())))
}

/// `multipart/byteranges` body for two or more ranges.
///
/// Each part carries exactly a `Content-Range` and a `Content-Type` header.
/// The encoded size is known up front through [`encoded_len`](Self::encoded_len),
/// before a single byte is produced.
#[pin_project]
pub struct MultipartStream<B> {
    state: MultipartState,
    ranges: Vec<ByteRange>,
    index: usize,
    total_size: u64,
    boundary: String,
    content_type: String,
    #[pin]
    body: B,
}

#[derive(Debug)]
enum MultipartState {
    PartHeader,
    Seek,
    Seeking,
    Reading { buffer: BytesMut, remaining: u64 },
    Finished,
}

impl<B: AsyncRead + AsyncSeekStart> MultipartStream<B> {
    /// `content_type` labels every part; `total_size` is the full
    /// representation size quoted in each `Content-Range`.
    pub fn new(body: B, ranges: Vec<ByteRange>, total_size: u64, content_type: impl Into<String>) -> Self {
        Self::with_boundary(body, ranges, total_size, content_type, generate_boundary())
    }

    pub fn with_boundary(
        body: B,
        ranges: Vec<ByteRange>,
        total_size: u64,
        content_type: impl Into<String>,
        boundary: String,
    ) -> Self {
        MultipartStream {
            state: MultipartState::PartHeader,
            ranges,
            index: 0,
            total_size,
            boundary,
            content_type: content_type.into(),
            body,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Response `Content-Type` announcing the boundary.
    pub fn response_content_type(&self) -> String {
        format!("multipart/byteranges; boundary={}", self.boundary)
    }

    /// Exact number of bytes this stream will yield.
    pub fn encoded_len(&self) -> u64 {
        encoded_len(&self.ranges, &self.boundary, &self.content_type, self.total_size)
    }
}

/// Size of the `multipart/byteranges` encoding of `ranges`, headers and
/// delimiters included.
pub fn encoded_len(ranges: &[ByteRange], boundary: &str, content_type: &str, total_size: u64) -> u64 {
    let parts: u64 = ranges
        .iter()
        .enumerate()
        .map(|(i, range)| part_header(i == 0, boundary, range, content_type, total_size).len() as u64 + range.length)
        .sum();
    parts + closing_delimiter(boundary, !ranges.is_empty()).len() as u64
}

fn part_header(first: bool, boundary: &str, range: &ByteRange, content_type: &str, total_size: u64) -> String {
    let lead = if first { "" } else { "\r\n" };
    format!(
        "{lead}--{boundary}\r\n\
         Content-Range: {}\r\n\
         Content-Type: {content_type}\r\n\r\n",
        range.content_range(total_size),
    )
}

fn closing_delimiter(boundary: &str, after_part: bool) -> String {
    let lead = if after_part { "\r\n" } else { "" };
    format!("{lead}--{boundary}--\r\n")
}

impl<B: AsyncRead + AsyncSeekStart> Stream for MultipartStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                MultipartState::PartHeader => {
                    let Some(range) = this.ranges.get(*this.index) else {
                        *this.state = MultipartState::Finished;
                        let closing = closing_delimiter(this.boundary, *this.index > 0);
                        return Poll::Ready(Some(Ok(Bytes::from(closing))));
                    };
                    let header = part_header(*this.index == 0, this.boundary, range, this.content_type, *this.total_size);
                    *this.state = MultipartState::Seek;
                    return Poll::Ready(Some(Ok(Bytes::from(header))));
                }

                MultipartState::Seek => {
                    let start = this.ranges[*this.index].start;
                    if let Err(e) = this.body.as_mut().start_seek(start) {
                        *this.state = MultipartState::Finished;
                        return Poll::Ready(Some(Err(e)));
                    }
                    *this.state = MultipartState::Seeking;
                }

                MultipartState::Seeking => {
                    if let Err(e) = ready!(this.body.as_mut().poll_complete(cx)) {
                        *this.state = MultipartState::Finished;
                        return Poll::Ready(Some(Err(e)));
                    }
                    let remaining = this.ranges[*this.index].length;
                    *this.state = MultipartState::Reading { buffer: allocate_buffer(), remaining };
                }

                MultipartState::Reading { buffer, remaining } => {
                    if *remaining == 0 {
                        *this.index += 1;
                        *this.state = MultipartState::PartHeader;
                        continue;
                    }
                    match ready!(poll_read_chunk(this.body.as_mut(), cx, buffer, remaining)) {
                        Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                        Some(Err(e)) => {
                            *this.state = MultipartState::Finished;
                            return Poll::Ready(Some(Err(e)));
                        }
                        None => continue,
                    }
                }

                MultipartState::Finished => return Poll::Ready(None),
            }
        }
    }
}

/// Fresh boundary token: 30 random bytes, hex encoded.
pub fn generate_boundary() -> String {
    let mut raw = [0u8; 30];
    rand::thread_rng().fill(&mut raw);
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}
