//! Serving a resource over a [`ChunkSink`].

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::chunk::{Chunk, ChunkSink, ChunkStreamWriter};
use crate::conditional::{evaluate, format_http_date, ConditionalContext, Precondition};
use crate::error::{RangeError, ServeError};
use crate::file::Resource;
use crate::headers::*;
use crate::range::{parse_range, sum_ranges_size};
use crate::sniff::{detect_content_type, SNIFF_LEN};
use crate::stream::{MultipartStream, RangedStream};
use crate::{read_full, seek_to, AsyncSeekStart};

const ERROR_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Serves the file at `path`. An empty `content_type` is derived from the
/// file name or, failing that, sniffed from the content.
pub async fn serve_file<S: ChunkSink>(
    sink: &mut S,
    content_type: &str,
    path: impl AsRef<Path>,
) -> Result<(), ServeError> {
    let resource = Resource::file(path).await?.with_content_type(content_type);
    serve_content(sink, resource).await
}

/// Serves `resource`, honoring the Range and conditional headers found in
/// the sink's metadata.
pub async fn serve_content<S, B>(sink: &mut S, resource: Resource<B>) -> Result<(), ServeError>
where
    S: ChunkSink,
    B: AsyncRead + AsyncSeekStart + Unpin + Send + 'static,
{
    serve_content_with(sink, resource, ResponseHeaders::new()).await
}

/// Like [`serve_content`], starting from headers the caller already set,
/// such as `cache-control` or `content-encoding`.
///
/// 304, 412, 416 and 500 are answered on the sink and reported as `Ok`.
/// Transport and seek failures are returned.
pub async fn serve_content_with<S, B>(
    sink: &mut S,
    resource: Resource<B>,
    mut outgoing: ResponseHeaders,
) -> Result<(), ServeError>
where
    S: ChunkSink,
    B: AsyncRead + AsyncSeekStart + Unpin + Send + 'static,
{
    let size = resource.byte_size();
    let name = resource.name().to_owned();
    let mod_time = resource.mod_time().filter(|t| *t != UNIX_EPOCH);
    let declared_type = resource.content_type().map(str::to_owned);

    if let Some(etag) = resource.etag() {
        outgoing.set(ETAG, etag);
    }
    if let Some(last_modified) = mod_time.and_then(format_http_date) {
        outgoing.set_value(LAST_MODIFIED, last_modified);
    }

    let ctx = ConditionalContext::from_headers(sink.metadata());
    let etag = outgoing.get(&ETAG).map(str::to_owned);
    let range_header = match evaluate(&ctx, etag.as_deref(), mod_time) {
        Precondition::Proceed { range } => range,
        Precondition::NotModified => {
            write_not_modified(&mut outgoing);
            return serve_done(sink, outgoing).await;
        }
        Precondition::PreconditionFailed => {
            outgoing.set_status(StatusCode::PRECONDITION_FAILED);
            return serve_done(sink, outgoing).await;
        }
    };

    let mut body = resource.into_body();
    let content_type = match declared_type {
        Some(content_type) => content_type,
        None => match mime_guess::from_path(&name).first_raw() {
            Some(guessed) => guessed.to_owned(),
            None => {
                // read a chunk to decide between utf-8 text and binary
                let mut buf = [0u8; SNIFF_LEN];
                let n = read_full(&mut body, &mut buf).await.unwrap_or(0);
                let sniffed = detect_content_type(&buf[..n]);
                // rewind to output whole content
                if let Err(e) = seek_to(&mut body, 0).await {
                    tracing::warn!(error = %e, "content is not seekable");
                    return serve_error(sink, outgoing, "seeker can't seek", StatusCode::INTERNAL_SERVER_ERROR).await;
                }
                sniffed.to_owned()
            }
        },
    };
    outgoing.set(CONTENT_TYPE, &content_type);

    let mut ranges = match parse_range(range_header.as_deref().unwrap_or(""), size) {
        Ok(ranges) => ranges,
        // some clients send Range on every request; an empty resource gets 200, not 416
        Err(RangeError::NoOverlap) if size == 0 => Vec::new(),
        Err(err) => {
            if err == RangeError::NoOverlap {
                outgoing.set(CONTENT_RANGE, &format!("bytes */{size}"));
            }
            tracing::debug!(range = ?range_header, size, error = %err, "range not satisfiable");
            return serve_error(sink, outgoing, &err.to_string(), StatusCode::RANGE_NOT_SATISFIABLE).await;
        }
    };

    if sum_ranges_size(&ranges) > size {
        // more bytes than the content itself: an attack or a confused client
        tracing::debug!(range = ?range_header, size, "ignoring oversized range set");
        ranges.clear();
    }

    if !name.is_empty() {
        outgoing.set(CONTENT_DISPOSITION, &format!("attachment; filename={name}"));
    }

    let partial = !ranges.is_empty();
    let (status, send_size, frame_type, content) = match ranges.len() {
        0 => (StatusCode::OK, size, content_type, Content::Ranged(RangedStream::new(body, size))),
        1 => {
            // a single range is never wrapped in multipart (RFC 7233 section 4.1)
            let range = ranges[0];
            seek_to(&mut body, range.start).await?;
            outgoing.set(CONTENT_RANGE, &range.content_range(size));
            (
                StatusCode::PARTIAL_CONTENT,
                range.length,
                content_type,
                Content::Ranged(RangedStream::new(body, range.length)),
            )
        }
        _ => {
            let parts = MultipartStream::new(body, ranges, size, content_type);
            let send_size = parts.encoded_len();
            let multipart_type = parts.response_content_type();
            outgoing.set(CONTENT_TYPE, &multipart_type);

            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(produce_parts(parts, tx));
            (StatusCode::PARTIAL_CONTENT, send_size, multipart_type, Content::Piped(rx))
        }
    };

    outgoing.set(ACCEPT_RANGES, "bytes");
    // a caller-set content-encoding means the bytes on the wire may differ
    // from the resource; only a range response still pins the length
    if partial || !outgoing.contains(&CONTENT_ENCODING) {
        outgoing.set(CONTENT_LENGTH, &send_size.to_string());
    }
    outgoing.set(TRANSFER_ENCODING, "identity");
    outgoing.set_status(status);

    tracing::debug!(status = status.as_u16(), size, send_size, "serving content");
    sink.send_header(outgoing).await?;

    let mut writer = ChunkStreamWriter::new(sink, frame_type);
    match content {
        Content::Ranged(stream) => writer.copy_stream(stream, send_size).await?,
        Content::Piped(rx) => {
            let piped = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
            writer.copy_stream(piped, send_size).await?
        }
    };
    Ok(())
}

enum Content<B> {
    Ranged(RangedStream<B>),
    Piped(mpsc::Receiver<io::Result<Bytes>>),
}

/// Runs the multipart encoder on its own task. The single-slot channel makes
/// it wait for the response path to take each piece; once the receiver is
/// gone the next send fails and the task ends.
async fn produce_parts<B>(parts: MultipartStream<B>, tx: mpsc::Sender<io::Result<Bytes>>)
where
    B: AsyncRead + AsyncSeekStart + Unpin,
{
    let mut parts = std::pin::pin!(parts);
    while let Some(item) = parts.next().await {
        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            tracing::debug!("multipart consumer went away, stopping producer");
            return;
        }
        if failed {
            return;
        }
    }
}

// RFC 7232 section 4.1: no representation metadata beyond what guides caches
fn write_not_modified(outgoing: &mut ResponseHeaders) {
    outgoing.remove(&CONTENT_TYPE);
    outgoing.remove(&CONTENT_LENGTH);
    outgoing.remove(&CONTENT_ENCODING);
    if outgoing.contains(&ETAG) {
        outgoing.remove(&LAST_MODIFIED);
    }
    outgoing.set_status(StatusCode::NOT_MODIFIED);
}

async fn serve_done<S: ChunkSink>(sink: &mut S, outgoing: ResponseHeaders) -> Result<(), ServeError> {
    tracing::debug!(status = ?outgoing.status(), "precondition decided the response");
    sink.send_header(outgoing).await?;
    Ok(())
}

async fn serve_error<S: ChunkSink>(
    sink: &mut S,
    mut outgoing: ResponseHeaders,
    text: &str,
    status: StatusCode,
) -> Result<(), ServeError> {
    for name in [CACHE_CONTROL, CONTENT_ENCODING, ETAG, LAST_MODIFIED, CONTENT_LENGTH] {
        outgoing.remove(&name);
    }
    outgoing.set(CONTENT_TYPE, ERROR_CONTENT_TYPE);
    outgoing.set(X_CONTENT_TYPE_OPTIONS, "nosniff");
    outgoing.set_status(status);

    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), reason = text, "serving error response");
    } else {
        tracing::debug!(status = status.as_u16(), reason = text, "serving error response");
    }
    sink.send_header(outgoing).await?;
    sink.send(Chunk::new(text.to_owned(), ERROR_CONTENT_TYPE)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, SystemTime};

    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::{init_tracing, RecordingSink, Unseekable};

    const ABC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    // Sun, 06 Nov 1994 08:49:37 GMT
    const T: u64 = 784111777;

    fn abc() -> Resource<Cursor<&'static [u8]>> {
        Resource::sized(Cursor::new(ABC), ABC.len() as u64).with_content_type("text/plain")
    }

    fn sized(size: usize) -> (Vec<u8>, Resource<Cursor<Vec<u8>>>) {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let resource = Resource::sized(Cursor::new(data.clone()), size as u64)
            .with_content_type("application/octet-stream");
        (data, resource)
    }

    async fn serve<B>(request: &[(&'static str, &'static str)], resource: Resource<B>) -> RecordingSink
    where
        B: AsyncRead + AsyncSeekStart + Unpin + Send + 'static,
    {
        serve_with(request, resource, ResponseHeaders::new()).await
    }

    async fn serve_with<B>(
        request: &[(&'static str, &'static str)],
        resource: Resource<B>,
        outgoing: ResponseHeaders,
    ) -> RecordingSink
    where
        B: AsyncRead + AsyncSeekStart + Unpin + Send + 'static,
    {
        init_tracing();
        let mut sink = RecordingSink::with_request(request);
        serve_content_with(&mut sink, resource, outgoing).await.expect("serve should succeed");
        sink
    }

    #[tokio::test]
    async fn test_full_response() {
        let sink = serve(&[], abc()).await;

        assert_eq!(Some(StatusCode::OK), sink.status());
        assert_eq!(Some("bytes"), sink.header(&ACCEPT_RANGES));
        assert_eq!(Some("62"), sink.header(&CONTENT_LENGTH));
        assert_eq!(Some("identity"), sink.header(&TRANSFER_ENCODING));
        assert_eq!(Some("text/plain"), sink.header(&CONTENT_TYPE));
        assert_eq!(None, sink.header(&CONTENT_RANGE));
        assert_eq!(None, sink.header(&CONTENT_DISPOSITION));
        assert_eq!(ABC.to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_single_ranges_serve_exact_slices() {
        let size = ABC.len() as u64;
        for (a, b) in [(0, 0), (0, 9), (10, 29), (30, 30), (40, 61), (61, 61)] {
            let header = format!("bytes={a}-{b}");
            let mut sink = RecordingSink::with_request(&[]);
            sink.set_request_header("range", &header);
            serve_content(&mut sink, abc()).await.unwrap();

            assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status(), "{header}");
            assert_eq!(Some(format!("bytes {a}-{b}/{size}").as_str()), sink.header(&CONTENT_RANGE));
            assert_eq!(Some((b - a + 1).to_string().as_str()), sink.header(&CONTENT_LENGTH));
            assert_eq!(ABC[a as usize..=b as usize].to_vec(), sink.body(), "{header}");
        }
    }

    #[tokio::test]
    async fn test_first_500_bytes() {
        let (data, resource) = sized(1000);
        let sink = serve(&[("range", "bytes=0-499")], resource).await;

        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status());
        assert_eq!(Some("bytes 0-499/1000"), sink.header(&CONTENT_RANGE));
        assert_eq!(data[..500].to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_suffix_range() {
        let (data, resource) = sized(1000);
        let sink = serve(&[("range", "bytes=-100")], resource).await;

        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status());
        assert_eq!(Some("bytes 900-999/1000"), sink.header(&CONTENT_RANGE));
        assert_eq!(data[900..].to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_range_end_exceeds_length() {
        let sink = serve(&[("range", "bytes=50-999")], abc()).await;
        assert_eq!(Some("bytes 50-61/62"), sink.header(&CONTENT_RANGE));
        assert_eq!(b"opqrstuvwxyz".to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_empty_resource_ignores_range() {
        let (_, resource) = sized(0);
        let sink = serve(&[("range", "bytes=0-10")], resource).await;

        assert_eq!(Some(StatusCode::OK), sink.status());
        assert_eq!(Some("0"), sink.header(&CONTENT_LENGTH));
        assert!(sink.body().is_empty());
    }

    #[tokio::test]
    async fn test_no_overlap_is_416() {
        let (_, resource) = sized(1000);
        let sink = serve(&[("range", "bytes=2000-3000")], resource).await;

        assert_eq!(Some(StatusCode::RANGE_NOT_SATISFIABLE), sink.status());
        assert_eq!(Some("bytes */1000"), sink.header(&CONTENT_RANGE));
        assert_eq!(Some(ERROR_CONTENT_TYPE), sink.header(&CONTENT_TYPE));
        assert_eq!(Some("nosniff"), sink.header(&X_CONTENT_TYPE_OPTIONS));
        assert_eq!(None, sink.header(&CONTENT_LENGTH));
        assert_eq!(b"invalid range: failed to overlap".to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_malformed_range_is_416() {
        let sink = serve(&[("range", "bytes=30-20")], abc()).await;

        assert_eq!(Some(StatusCode::RANGE_NOT_SATISFIABLE), sink.status());
        assert_eq!(None, sink.header(&CONTENT_RANGE));
        assert_eq!(b"invalid range".to_vec(), sink.body());
        assert!(sink.chunks.iter().all(|c| c.content_type == ERROR_CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_error_strips_cache_headers() {
        let mut preset = ResponseHeaders::new();
        preset.set(CACHE_CONTROL, "max-age=60");
        preset.set(CONTENT_ENCODING, "gzip");
        let resource = abc().with_etag("\"v1\"").with_mod_time(Some(SystemTime::UNIX_EPOCH + Duration::from_secs(T)));
        let sink = serve_with(&[("range", "bytes=100-")], resource, preset).await;

        assert_eq!(Some(StatusCode::RANGE_NOT_SATISFIABLE), sink.status());
        for name in [CACHE_CONTROL, CONTENT_ENCODING, ETAG, LAST_MODIFIED, CONTENT_LENGTH] {
            assert_eq!(None, sink.header(&name), "{name}");
        }
    }

    #[tokio::test]
    async fn test_oversized_range_set_serves_full_content() {
        let sink = serve(&[("range", "bytes=0-61,0-61")], abc()).await;
        assert_eq!(Some(StatusCode::OK), sink.status());
        assert_eq!(ABC.to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_multiple_ranges() {
        let sink = serve(&[("range", "bytes=0-9,20-29,-1")], abc()).await;
        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status());

        let content_type = sink.header(&CONTENT_TYPE).unwrap().to_owned();
        let boundary = content_type.strip_prefix("multipart/byteranges; boundary=").unwrap();
        let expected = format!(
            "--{boundary}\r\nContent-Range: bytes 0-9/62\r\nContent-Type: text/plain\r\n\r\n0123456789\
             \r\n--{boundary}\r\nContent-Range: bytes 20-29/62\r\nContent-Type: text/plain\r\n\r\nKLMNOPQRST\
             \r\n--{boundary}\r\nContent-Range: bytes 61-61/62\r\nContent-Type: text/plain\r\n\r\nz\
             \r\n--{boundary}--\r\n"
        );
        let body = sink.body();
        assert_eq!(expected, String::from_utf8(body.clone()).unwrap());
        assert_eq!(Some(body.len().to_string().as_str()), sink.header(&CONTENT_LENGTH));
        assert_eq!(None, sink.header(&CONTENT_RANGE));
        assert!(sink.chunks.iter().all(|c| c.content_type == content_type));
    }

    #[tokio::test]
    async fn test_multiple_ranges_declared_length_is_exact() {
        let (_, resource) = sized(100_000);
        let sink = serve(&[("range", "bytes=0-70000,90000-")], resource).await;

        let declared: usize = sink.header(&CONTENT_LENGTH).unwrap().parse().unwrap();
        assert_eq!(declared, sink.body().len());
        assert!(sink.chunks.iter().all(|c| c.data.len() <= crate::MAX_CHUNK_SIZE));
    }

    #[tokio::test]
    async fn test_multipart_transport_failure_propagates() {
        let (_, resource) = sized(100_000);
        let mut sink = RecordingSink::with_request(&[("range", "bytes=0-70000,90000-")]).fail_after(2);
        let result = serve_content(&mut sink, resource).await;

        assert_matches!(result, Err(ServeError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe);
        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status());
    }

    #[tokio::test]
    async fn test_if_none_match_is_304() {
        let resource = abc().with_etag("\"abc\"").with_mod_time(Some(SystemTime::UNIX_EPOCH + Duration::from_secs(T)));
        let sink = serve(&[("if-none-match", "\"abc\"")], resource).await;

        assert_eq!(Some(StatusCode::NOT_MODIFIED), sink.status());
        assert_eq!(None, sink.header(&CONTENT_TYPE));
        assert_eq!(None, sink.header(&CONTENT_LENGTH));
        assert_eq!(None, sink.header(&LAST_MODIFIED));
        assert_eq!(Some("\"abc\""), sink.header(&ETAG));
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_if_modified_since_is_304_keeping_last_modified() {
        let resource = abc().with_mod_time(Some(SystemTime::UNIX_EPOCH + Duration::from_secs(T)));
        let sink = serve(&[("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT")], resource).await;

        assert_eq!(Some(StatusCode::NOT_MODIFIED), sink.status());
        assert_eq!(Some("Sun, 06 Nov 1994 08:49:37 GMT"), sink.header(&LAST_MODIFIED));
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_if_match_failure_is_412() {
        let resource = abc().with_etag("\"abc\"");
        let sink = serve(&[("if-match", "\"xyz\""), ("range", "bytes=0-1")], resource).await;

        assert_eq!(Some(StatusCode::PRECONDITION_FAILED), sink.status());
        assert_eq!(None, sink.header(&CONTENT_RANGE));
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_if_range_mismatch_serves_full_content() {
        let resource = abc().with_etag("\"v2\"");
        let sink = serve(&[("if-range", "\"v1\""), ("range", "bytes=0-0,-1")], resource).await;

        assert_eq!(Some(StatusCode::OK), sink.status());
        assert_eq!(Some("text/plain"), sink.header(&CONTENT_TYPE));
        assert_eq!(ABC.to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_if_range_match_serves_range() {
        let resource = abc().with_etag("\"v1\"");
        let sink = serve(&[("if-range", "\"v1\""), ("range", "bytes=0-0")], resource).await;
        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status());
        assert_eq!(b"0".to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_content_encoding_suppresses_length_for_full_response() {
        let mut preset = ResponseHeaders::new();
        preset.set(CONTENT_ENCODING, "gzip");
        let sink = serve_with(&[], abc(), preset.clone()).await;
        assert_eq!(None, sink.header(&CONTENT_LENGTH));
        assert_eq!(Some("gzip"), sink.header(&CONTENT_ENCODING));
        assert_eq!(ABC.to_vec(), sink.body());

        let sink = serve_with(&[("range", "bytes=0-4")], abc(), preset).await;
        assert_eq!(Some("5"), sink.header(&CONTENT_LENGTH));
    }

    #[tokio::test]
    async fn test_content_type_from_name() {
        let resource = Resource::sized(Cursor::new(ABC), 62).with_name("notes.txt");
        let sink = serve(&[], resource).await;
        assert_eq!(Some("text/plain"), sink.header(&CONTENT_TYPE));
        assert_eq!(Some("attachment; filename=notes.txt"), sink.header(&CONTENT_DISPOSITION));
    }

    #[tokio::test]
    async fn test_content_type_sniffed_then_rewound() {
        let resource = Resource::sized(Cursor::new(ABC), 62);
        let sink = serve(&[], resource).await;
        assert_eq!(Some("text/plain; charset=utf-8"), sink.header(&CONTENT_TYPE));
        assert_eq!(ABC.to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_unseekable_content_is_500() {
        let resource = Resource::sized(Unseekable::new(ABC), 62);
        let sink = serve(&[], resource).await;

        assert_eq!(Some(StatusCode::INTERNAL_SERVER_ERROR), sink.status());
        assert_eq!(b"seeker can't seek".to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_pre_epoch_mod_time_omits_last_modified() {
        let resource = abc().with_mod_time(Some(SystemTime::UNIX_EPOCH - Duration::from_secs(86400)));
        let sink = serve(&[("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT")], resource).await;

        assert_eq!(Some(StatusCode::NOT_MODIFIED), sink.status());
        assert_eq!(None, sink.header(&LAST_MODIFIED));

        let resource = abc().with_mod_time(Some(SystemTime::UNIX_EPOCH - Duration::from_secs(86400)));
        let sink = serve(&[], resource).await;
        assert_eq!(Some(StatusCode::OK), sink.status());
        assert_eq!(ABC.to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_utf8_name_in_content_disposition() {
        let resource = abc().with_name("résumé.txt");
        let sink = serve(&[], resource).await;
        assert_eq!(Some("attachment; filename=résumé.txt"), sink.header(&CONTENT_DISPOSITION));
    }

    #[tokio::test]
    async fn test_obs_text_etag_matches() {
        let resource = abc().with_etag("\"é\"");
        let sink = serve(&[("if-none-match", "\"é\"")], resource).await;

        assert_eq!(Some(StatusCode::NOT_MODIFIED), sink.status());
        assert_eq!(Some("\"é\""), sink.header(&ETAG));
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_epoch_mod_time_is_unspecified() {
        let resource = abc().with_mod_time(Some(SystemTime::UNIX_EPOCH));
        let sink = serve(&[("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT")], resource).await;
        assert_eq!(Some(StatusCode::OK), sink.status());
        assert_eq!(None, sink.header(&LAST_MODIFIED));
    }

    #[tokio::test]
    async fn test_serve_file() {
        init_tracing();
        let mut sink = RecordingSink::with_request(&[("range", "bytes=6-10")]);
        serve_file(&mut sink, "", "test/fixture.txt").await.unwrap();

        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status());
        assert_eq!(Some("text/plain"), sink.header(&CONTENT_TYPE));
        assert_eq!(Some("attachment; filename=fixture.txt"), sink.header(&CONTENT_DISPOSITION));
        assert_eq!(Some("bytes 6-10/54"), sink.header(&CONTENT_RANGE));
        assert!(sink.header(&LAST_MODIFIED).is_some());
        assert_eq!(b"world".to_vec(), sink.body());
    }

    #[tokio::test]
    async fn test_serve_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RecordingSink::with_request(&[]);
        let result = serve_file(&mut sink, "", dir.path()).await;

        assert_matches!(result, Err(ServeError::InvalidPath(_)));
        assert_eq!(None, sink.status());
    }
}
