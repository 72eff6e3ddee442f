use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::{BlobError, BlobResult, ByteStream, FileId, FileRecord};

/// Durable mapping from file identifier to metadata and payload.
///
/// Every mutation is atomic with respect to readers: a record is never
/// observable without its payload, and a replaced payload is seen either
/// entirely old or entirely new.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a new file under a freshly allocated identifier
    async fn create(&self, put: FilePut, body: ByteStream) -> BlobResult<FileRecord> {
        self.create_with_id(FileId::new(), put, body).await
    }

    /// Store a new file under a caller supplied identifier.
    ///
    /// Fails with `AlreadyExists` if the identifier is taken.
    async fn create_with_id(
        &self,
        id: FileId,
        put: FilePut,
        body: ByteStream,
    ) -> BlobResult<FileRecord>;

    async fn exists(&self, id: &FileId) -> BlobResult<bool>;

    /// Get file metadata without content
    async fn get_metadata(&self, id: &FileId) -> BlobResult<FileRecord>;

    /// Open the payload for reading together with the metadata it belongs to
    async fn get_payload(&self, id: &FileId) -> BlobResult<(Payload, FileRecord)>;

    /// All stored files, in no particular order
    async fn list_all(&self) -> BlobResult<Vec<FileRecord>>;

    /// Replace the caller-editable metadata (`name`, `media_type`) of an existing file
    async fn update_metadata(&self, record: FileRecord) -> BlobResult<FileRecord>;

    /// Overwrite the payload of an existing file
    async fn replace_payload(
        &self,
        id: &FileId,
        put: FilePut,
        body: ByteStream,
    ) -> BlobResult<FileRecord>;

    /// Remove metadata and payload together
    async fn delete(&self, id: &FileId) -> BlobResult<()>;
}

/// Request to store a payload
#[derive(Debug, Clone)]
pub struct FilePut {
    pub media_type: String,
    pub name: Option<String>,
    /// Declared length; when present the received byte count must match it
    pub size_hint: Option<u64>,
}

impl FilePut {
    pub fn new<S: Into<String>>(media_type: S) -> Self {
        Self {
            media_type: media_type.into(),
            name: None,
            size_hint: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_optional_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub(crate) fn validate(&self) -> BlobResult<()> {
        if self.media_type.trim().is_empty() {
            return Err(BlobError::invalid_media_type("media type must not be empty"));
        }
        Ok(())
    }

    /// Compare the number of bytes actually received with the declared size
    pub(crate) fn check_received(&self, received: u64) -> BlobResult<()> {
        match self.size_hint {
            Some(expected) if expected != received => Err(BlobError::invalid_range(format!(
                "declared size {} but received {} bytes",
                expected, received
            ))),
            _ => Ok(()),
        }
    }
}

/// Random access reader over a stored payload
pub trait SeekableReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> SeekableReader for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// How the payload bytes can be consumed
pub enum PayloadBody {
    /// Supports seeking, so byte ranges can be served
    Seekable(Box<dyn SeekableReader>),
    /// Forward-only stream
    Stream(ByteStream),
}

/// An opened payload of known length
pub struct Payload {
    pub body: PayloadBody,
    pub length: u64,
}

impl Payload {
    pub fn seekable<R: SeekableReader + 'static>(reader: R, length: u64) -> Self {
        Self {
            body: PayloadBody::Seekable(Box::new(reader)),
            length,
        }
    }

    pub fn stream(stream: ByteStream, length: u64) -> Self {
        Self {
            body: PayloadBody::Stream(stream),
            length,
        }
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self.body, PayloadBody::Seekable(_))
    }

    /// Consume the whole payload as a stream
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            PayloadBody::Seekable(reader) => Box::pin(ReaderStream::new(reader)),
            PayloadBody::Stream(stream) => stream,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("length", &self.length)
            .field("seekable", &self.is_seekable())
            .finish()
    }
}

/// Map a failure of an incoming body stream.
///
/// `InvalidData` is raised by [`limit_stream`] and means the client sent too much.
pub(crate) fn body_error(error: std::io::Error) -> BlobError {
    if error.kind() == std::io::ErrorKind::InvalidData {
        BlobError::invalid(error.to_string())
    } else {
        BlobError::internal("reading request body", error)
    }
}

/// Cap a body stream at `max_bytes`, failing with `InvalidData` past the cap
pub fn limit_stream(body: ByteStream, max_bytes: u64) -> ByteStream {
    let stream = async_stream::stream! {
        let mut body = body;
        let mut seen = 0u64;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    seen += chunk.len() as u64;
                    if seen > max_bytes {
                        yield Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("payload exceeds maximum of {} bytes", max_bytes),
                        ));
                        return;
                    }
                    yield Ok(chunk);
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    };
    Box::pin(stream)
}

/// Drain a body stream into a file, returning the number of bytes written
pub(crate) async fn copy_stream_to_file(
    mut body: ByteStream,
    file: &mut tokio::fs::File,
) -> BlobResult<u64> {
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(body_error)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Buffer a body stream in memory
pub(crate) async fn collect_stream(mut body: ByteStream) -> BlobResult<Bytes> {
    let mut data = BytesMut::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk.map_err(body_error)?);
    }
    Ok(data.freeze())
}

/// Turn a single buffer into a byte stream
pub fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}
