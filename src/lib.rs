//! # stream-range
//!
//! HTTP range requests (RFC 7233), conditional requests (RFC 7232) and
//! multipart form uploads over transports that move discrete frames instead
//! of a byte socket.
//!
//! Such a transport cannot seek on the wire or revise headers once the body
//! has started, so every response header, including the length of a
//! `multipart/byteranges` body that has not been produced yet, is computed
//! and committed before the first body frame.
//!
//! Transports plug in through two capabilities: [`ChunkSink`] for downloads
//! and [`ChunkSource`] for uploads. Content is any [`AsyncRead`] that also
//! implements [`AsyncSeekStart`], which is a trait defined by this crate that
//! only allows seeking from the start. It is automatically implemented for any
//! type implementing [`AsyncSeek`].
//!
//! ```no_run
//! use stream_range::{serve_file, ChunkSink, FormConfig, FormData, ChunkSource, UploadError};
//!
//! async fn download<S: ChunkSink>(sink: &mut S) -> Result<(), stream_range::ServeError> {
//!     serve_file(sink, "", "document.txt").await
//! }
//!
//! async fn upload<U>(upload: U) -> Result<(), UploadError>
//! where
//!     U: ChunkSource + Unpin + Send + 'static,
//! {
//!     let config = FormConfig { size_limit: 100 << 20, ..FormConfig::default() };
//!     let form = FormData::parse(upload, &config).await?;
//!     if let Some(file) = form.first_file("key1") {
//!         let _bytes = file.bytes().await?;
//!     }
//!     form.remove_all()?;
//!     Ok(())
//! }
//! ```

mod chunk;
mod conditional;
mod error;
mod file;
mod headers;
mod range;
mod serve;
mod sniff;
mod stream;
mod upload;

#[cfg(test)]
mod testing;

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use chunk::{Chunk, ChunkSink, ChunkSource, ChunkStreamReader, ChunkStreamWriter, MAX_CHUNK_SIZE};
pub use conditional::{
    etag_strong_match, etag_weak_match, evaluate, format_http_date, parse_http_date, scan_etag,
    ConditionalContext, Precondition,
};
pub use error::{is_size_limit_exceeded, size_limit_exceeded, RangeError, ServeError, SizeLimitExceeded, UploadError};
pub use file::Resource;
pub use headers::ResponseHeaders;
pub use range::{parse_range, sum_ranges_size, ByteRange};
pub use serve::{serve_content, serve_content_with, serve_file};
pub use sniff::detect_content_type;
pub use stream::{encoded_len, generate_boundary, MultipartStream, RangedStream};
pub use upload::{parse_boundary, process_each_part, FormConfig, FormData, FormFile, FormFileReader};

/// Outbound header names, including the out-of-band `code`.
pub mod header {
    pub use crate::headers::{
        ACCEPT_RANGES, CACHE_CONTROL, CODE, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH,
        CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED, TRANSFER_ENCODING, VOCABULARY,
        X_CONTENT_TYPE_OPTIONS,
    };
}

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// Seeks `body` to `position` and waits for the seek to land.
pub(crate) async fn seek_to<B: AsyncSeekStart + Unpin>(body: &mut B, position: u64) -> io::Result<()> {
    Pin::new(&mut *body).start_seek(position)?;
    poll_fn(|cx| Pin::new(&mut *body).poll_complete(cx)).await
}

/// Fills `buf` as far as `body` allows, stopping early only at end of input.
pub(crate) async fn read_full<B: AsyncRead + Unpin>(body: &mut B, buf: &mut [u8]) -> io::Result<usize> {
    use tokio::io::AsyncReadExt;

    let mut filled = 0;
    while filled < buf.len() {
        match body.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
