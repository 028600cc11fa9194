//! Multipart form uploads read from a [`ChunkSource`].

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Cursor};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use mime_guess::mime::{self, Mime};
use multer::{Field, Multipart};
use serde::Deserialize;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};

use crate::chunk::{ChunkSource, ChunkStreamReader};
use crate::error::UploadError;

/// Non-file parts may use this much beyond `max_memory`.
const VALUE_ALLOWANCE: u64 = 10 << 20;

/// Limits applied while decoding an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Cap on the whole upload body in bytes. 0 means unlimited.
    pub size_limit: u64,
    /// File parts are kept in memory up to this many bytes in total; the
    /// rest spill to temporary files.
    pub max_memory: u64,
}

impl Default for FormConfig {
    fn default() -> Self {
        FormConfig { size_limit: 0, max_memory: 100 << 20 }
    }
}

/// Extracts the boundary from an upload's `Content-Type`. Only
/// `multipart/form-data` and `multipart/mixed` are accepted.
pub fn parse_boundary(content_type: Option<&str>) -> Result<String, UploadError> {
    let content_type = content_type.filter(|c| !c.is_empty()).ok_or(UploadError::NotMultipart)?;
    let media: Mime = content_type.parse().map_err(|_| UploadError::NotMultipart)?;

    let subtype = media.subtype();
    if media.type_() != mime::MULTIPART || !(subtype == mime::FORM_DATA || subtype.as_str() == "mixed") {
        return Err(UploadError::NotMultipart);
    }
    media
        .get_param(mime::BOUNDARY)
        .map(|boundary| boundary.as_str().trim_matches('"').to_owned())
        .filter(|boundary| !boundary.is_empty())
        .ok_or(UploadError::MissingBoundary)
}

fn request_boundary(metadata: &HeaderMap) -> Result<String, UploadError> {
    parse_boundary(metadata.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()))
}

fn open_multipart<U>(upload: U, size_limit: u64) -> Result<Multipart<'static>, UploadError>
where
    U: ChunkSource + Unpin + Send + 'static,
{
    let boundary = request_boundary(upload.metadata())?;
    Ok(Multipart::with_reader(ChunkStreamReader::with_limit(upload, size_limit), boundary))
}

/// A decoded form: uploaded files and text values, each keyed by field name
/// in arrival order.
///
/// Spooled files live until [`remove_all`](Self::remove_all) is called or the
/// form is dropped.
#[derive(Debug, Default)]
pub struct FormData {
    files: HashMap<String, Vec<FormFile>>,
    values: HashMap<String, Vec<String>>,
}

impl FormData {
    /// Reads the whole form from `upload`. The boundary is taken from the
    /// request's `Content-Type`.
    ///
    /// Parts without a name are skipped. On error, anything spooled so far is
    /// removed.
    pub async fn parse<U>(upload: U, config: &FormConfig) -> Result<FormData, UploadError>
    where
        U: ChunkSource + Unpin + Send + 'static,
    {
        let mut multipart = open_multipart(upload, config.size_limit)?;
        let mut form = FormData::default();
        let mut budget = MemoryBudget {
            files: config.max_memory,
            values: config.max_memory.saturating_add(VALUE_ALLOWANCE),
        };

        while let Some(mut field) = multipart.next_field().await? {
            let name = match field.name() {
                Some(name) if !name.is_empty() => name.to_owned(),
                _ => continue,
            };

            match field.file_name().map(str::to_owned) {
                None => {
                    let mut value = BytesMut::new();
                    while let Some(chunk) = field.chunk().await? {
                        if (value.len() + chunk.len()) as u64 > budget.values {
                            return Err(UploadError::MessageTooLarge);
                        }
                        value.extend_from_slice(&chunk);
                    }
                    budget.values -= value.len() as u64;
                    form.values.entry(name).or_default().push(String::from_utf8_lossy(&value).into_owned());
                }
                Some(file_name) => {
                    let file = FormFile::receive(field, file_name, &mut budget).await?;
                    form.files.entry(name).or_default().push(file);
                }
            }
        }

        tracing::debug!(files = form.files.len(), values = form.values.len(), "parsed multipart form");
        Ok(form)
    }

    pub fn files(&self, key: &str) -> &[FormFile] {
        self.files.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first_file(&self, key: &str) -> Option<&FormFile> {
        self.files(key).first()
    }

    pub fn values(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    /// Deletes every spooled file. All files are attempted; the first
    /// failure is returned.
    pub fn remove_all(self) -> io::Result<()> {
        let mut result = Ok(());
        for file in self.files.into_values().flatten() {
            if let Storage::Disk(path) = file.storage {
                if let Err(e) = path.close() {
                    tracing::warn!(error = %e, "failed to remove spooled upload");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }
}

struct MemoryBudget {
    files: u64,
    values: u64,
}

/// One uploaded file part.
#[derive(Debug)]
pub struct FormFile {
    file_name: String,
    content_type: Option<String>,
    size: u64,
    storage: Storage,
}

#[derive(Debug)]
enum Storage {
    Memory(Bytes),
    Disk(TempPath),
}

impl FormFile {
    async fn receive(mut field: Field<'static>, file_name: String, budget: &mut MemoryBudget) -> Result<FormFile, UploadError> {
        let content_type = field.content_type().map(Mime::to_string);
        let mut buffer = BytesMut::new();
        let mut spool: Option<(tokio::fs::File, TempPath)> = None;
        let mut size = 0u64;

        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            match spool.as_mut() {
                Some((file, _)) => file.write_all(&chunk).await?,
                None if size > budget.files => {
                    let (file, path) = tempfile::Builder::new().prefix("multipart-").tempfile()?.into_parts();
                    let mut file = tokio::fs::File::from_std(file);
                    file.write_all(&buffer).await?;
                    file.write_all(&chunk).await?;
                    tracing::debug!(file_name = %file_name, path = %path.display(), "spooling upload to disk");
                    buffer = BytesMut::new();
                    spool = Some((file, path));
                }
                None => buffer.extend_from_slice(&chunk),
            }
        }

        let storage = match spool {
            Some((mut file, path)) => {
                file.flush().await?;
                Storage::Disk(path)
            }
            None => {
                budget.files -= size;
                budget.values = budget.values.saturating_sub(size);
                Storage::Memory(buffer.freeze())
            }
        };
        Ok(FormFile { file_name, content_type, size, storage })
    }

    /// The client-supplied file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the content was written to a temporary file.
    pub fn is_spooled(&self) -> bool {
        matches!(self.storage, Storage::Disk(_))
    }

    /// Location of the temporary file for spooled content.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Disk(path) => Some(&**path),
            Storage::Memory(_) => None,
        }
    }

    pub async fn open(&self) -> io::Result<FormFileReader> {
        match &self.storage {
            Storage::Memory(data) => Ok(FormFileReader::Memory(Cursor::new(data.clone()))),
            Storage::Disk(path) => Ok(FormFileReader::Disk(tokio::fs::File::open(path).await?)),
        }
    }

    /// The whole content.
    pub async fn bytes(&self) -> io::Result<Bytes> {
        match &self.storage {
            Storage::Memory(data) => Ok(data.clone()),
            Storage::Disk(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

/// Reader over a [`FormFile`], wherever it is stored.
#[derive(Debug)]
pub enum FormFileReader {
    Memory(Cursor<Bytes>),
    Disk(tokio::fs::File),
}

impl AsyncRead for FormFileReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            FormFileReader::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            FormFileReader::Disk(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

/// Streams an upload part by part without buffering it, handing each part
/// to `handler` as it arrives.
///
/// Stops at the end of the body or at the first read or handler error.
pub async fn process_each_part<U, F, Fut>(upload: U, size_limit: u64, mut handler: F) -> Result<(), UploadError>
where
    U: ChunkSource + Unpin + Send + 'static,
    F: FnMut(Field<'static>) -> Fut,
    Fut: Future<Output = Result<(), UploadError>>,
{
    let mut multipart = open_multipart(upload, size_limit)?;
    let mut parts = 0usize;
    while let Some(field) = multipart.next_field().await? {
        handler(field).await?;
        parts += 1;
    }
    tracing::debug!(parts, "processed multipart upload");
    Ok(())
}
