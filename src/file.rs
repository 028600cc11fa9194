use std::io;
use std::path::Path;
use std::pin::Pin;
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};

use crate::error::ServeError;
use crate::AsyncSeekStart;

/// Seekable content plus the metadata needed to serve it.
pub struct Resource<B> {
    body: B,
    byte_size: u64,
    mod_time: Option<SystemTime>,
    etag: Option<String>,
    content_type: Option<String>,
    name: String,
}

impl<B> std::fmt::Debug for Resource<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("byte_size", &self.byte_size)
            .field("mod_time", &self.mod_time)
            .field("etag", &self.etag)
            .field("content_type", &self.content_type)
            .field("name", &self.name)
            .finish()
    }
}

impl Resource<tokio::fs::File> {
    /// Opens `path`, taking size, modification time and name from the file
    /// system. Directories are rejected.
    pub async fn file(path: impl AsRef<Path>) -> Result<Resource<tokio::fs::File>, ServeError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(ServeError::InvalidPath(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Resource::sized(file, metadata.len())
            .with_mod_time(metadata.modified().ok())
            .with_name(name))
    }
}

impl<B: AsyncRead + AsyncSeekStart> Resource<B> {
    /// Construct a [`Resource`] with a byte size supplied manually.
    pub fn sized(body: B, byte_size: u64) -> Self {
        Resource { body, byte_size, mod_time: None, etag: None, content_type: None, name: String::new() }
    }

    /// `None` or the Unix epoch mean the time is unknown.
    pub fn with_mod_time(mut self, mod_time: Option<SystemTime>) -> Self {
        self.mod_time = mod_time;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// An empty string is the same as no content type, which makes the server
    /// derive one.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into()).filter(|c| !c.is_empty());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn mod_time(&self) -> Option<SystemTime> {
        self.mod_time
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_body(self) -> B {
        self.body
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin> Resource<B> {
    /// Uses `seek` to determine size by seeking to the end and getting stream
    /// position, then rewinds.
    pub async fn seek(mut body: B) -> io::Result<Resource<B>> {
        let byte_size = Pin::new(&mut body).seek(io::SeekFrom::End(0)).await?;
        Pin::new(&mut body).seek(io::SeekFrom::Start(0)).await?;
        Ok(Resource::sized(body, byte_size))
    }
}
