//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to resolve a `Range` header against a resource size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The header is syntactically malformed.
    #[error("invalid range")]
    InvalidRange,

    /// The header is well formed but every range starts past the end of the
    /// content.
    #[error("invalid range: failed to overlap")]
    NoOverlap,
}

/// An upload read more bytes than its configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("size limit exceeded")]
pub struct SizeLimitExceeded {
    /// The configured cap in bytes.
    pub limit: u64,
}

impl From<SizeLimitExceeded> for io::Error {
    fn from(err: SizeLimitExceeded) -> Self {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

/// Recovers a [`SizeLimitExceeded`] carried inside an [`io::Error`].
pub fn size_limit_exceeded(err: &io::Error) -> Option<SizeLimitExceeded> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<SizeLimitExceeded>())
        .copied()
}

/// Reports whether `err` was raised by a size-limited chunk reader.
pub fn is_size_limit_exceeded(err: &io::Error) -> bool {
    size_limit_exceeded(err).is_some()
}

/// Errors surfaced while decoding a multipart upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request Content-Type isn't multipart/form-data")]
    NotMultipart,

    #[error("no multipart boundary param in Content-Type")]
    MissingBoundary,

    /// The upload crossed the configured size cap.
    #[error(transparent)]
    SizeLimitExceeded(#[from] SizeLimitExceeded),

    /// Text values outgrew the in-memory allowance.
    #[error("multipart: message too large")]
    MessageTooLarge,

    #[error("malformed multipart body: {0}")]
    Multipart(multer::Error),

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        match size_limit_exceeded(&err) {
            Some(limit) => UploadError::SizeLimitExceeded(limit),
            None => UploadError::Io(err),
        }
    }
}

impl From<multer::Error> for UploadError {
    fn from(err: multer::Error) -> Self {
        match err {
            // reader failures arrive boxed; dig the io::Error back out
            multer::Error::StreamReadFailed(inner) => match inner.downcast::<io::Error>() {
                Ok(io_err) => UploadError::from(*io_err),
                Err(other) => UploadError::Multipart(multer::Error::StreamReadFailed(other)),
            },
            other => UploadError::Multipart(other),
        }
    }
}

/// Fatal failures while serving content. Protocol outcomes such as 304, 412
/// or 416 are responses, not errors.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid path {}", .0.display())]
    InvalidPath(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}
