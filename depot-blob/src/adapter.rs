use std::sync::Arc;

use crate::store::limit_stream;
use crate::{
    range, BlobConfig, BlobError, BlobResult, ByteRange, ByteStream, ContentStore,
    DefaultUploadCoordinator, FileId, FilePut, FileRecord, OpenedBlob, SegmentUpload, SessionId,
    UploadCoordinator, UploadProgress, UploadSession, UploadSessionStore,
};

/// Partial change of the caller-editable file metadata.
///
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub name: Option<String>,
    pub media_type: Option<String>,
}

/// The main blob adapter - what the HTTP layer and embedding services hold on to
pub struct BlobAdapter {
    content: Arc<dyn ContentStore>,
    uploads: Arc<dyn UploadCoordinator>,
    config: BlobConfig,
}

impl BlobAdapter {
    /// Create an adapter whose uploads are assembled into `content`
    pub fn new<C, S>(content: C, sessions: S, config: BlobConfig) -> Self
    where
        C: ContentStore + 'static,
        S: UploadSessionStore + 'static,
    {
        let content: Arc<dyn ContentStore> = Arc::new(content);
        let uploads =
            DefaultUploadCoordinator::from_shared(content.clone(), Arc::new(sessions), config.clone());
        Self {
            content,
            uploads: Arc::new(uploads),
            config,
        }
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn uploads(&self) -> &Arc<dyn UploadCoordinator> {
        &self.uploads
    }

    /// Get configuration
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    fn check_size(&self, put: &FilePut, body: ByteStream) -> BlobResult<ByteStream> {
        if let Some(size) = put.size_hint {
            if size > self.config.max_blob_bytes {
                return Err(BlobError::invalid(format!(
                    "file size {} exceeds maximum {}",
                    size, self.config.max_blob_bytes
                )));
            }
        }
        Ok(limit_stream(body, self.config.max_blob_bytes))
    }

    /// Store a file from a stream (single-shot upload)
    pub async fn put(&self, put: FilePut, body: ByteStream) -> BlobResult<FileRecord> {
        let body = self.check_size(&put, body)?;
        self.content.create(put, body).await
    }

    /// Open a file for reading, honouring an optional raw `Range` header value
    pub async fn open(&self, id: &FileId, range: Option<&str>) -> BlobResult<OpenedBlob> {
        let (payload, record) = self.content.get_payload(id).await?;
        range::serve(payload, record, range).await
    }

    pub async fn metadata(&self, id: &FileId) -> BlobResult<FileRecord> {
        self.content.get_metadata(id).await
    }

    /// All files, oldest first
    pub async fn list(&self) -> BlobResult<Vec<FileRecord>> {
        let mut records = self.content.list_all().await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Replace name and media type; a missing name clears it
    pub async fn replace_metadata(
        &self,
        id: &FileId,
        name: Option<String>,
        media_type: String,
    ) -> BlobResult<FileRecord> {
        let mut record = self.content.get_metadata(id).await?;
        record.name = name;
        record.media_type = media_type;
        self.content.update_metadata(record).await
    }

    pub async fn patch_metadata(&self, id: &FileId, patch: MetadataPatch) -> BlobResult<FileRecord> {
        let mut record = self.content.get_metadata(id).await?;
        if let Some(name) = patch.name {
            record.name = Some(name);
        }
        if let Some(media_type) = patch.media_type {
            record.media_type = media_type;
        }
        self.content.update_metadata(record).await
    }

    /// Overwrite the payload of an existing file
    pub async fn replace(&self, id: &FileId, put: FilePut, body: ByteStream) -> BlobResult<FileRecord> {
        let body = self.check_size(&put, body)?;
        self.content.replace_payload(id, put, body).await
    }

    /// Delete a file
    pub async fn delete(&self, id: &FileId) -> BlobResult<()> {
        self.content.delete(id).await
    }

    /// Begin a resumable upload
    pub async fn begin_upload(&self, file_name: Option<String>) -> BlobResult<UploadSession> {
        self.uploads.begin(file_name).await
    }

    /// Upload one segment of a resumable upload
    pub async fn upload_segment(
        &self,
        session_id: &SessionId,
        segment: SegmentUpload,
        body: ByteStream,
    ) -> BlobResult<UploadSession> {
        self.uploads.upload_segment(session_id, segment, body).await
    }

    /// Get upload session
    pub async fn upload_session(&self, session_id: &SessionId) -> BlobResult<UploadSession> {
        self.uploads.get(session_id).await
    }

    pub async fn upload_sessions(&self) -> BlobResult<Vec<UploadSession>> {
        self.uploads.list().await
    }

    pub async fn upload_progress(&self, session_id: &SessionId) -> BlobResult<UploadProgress> {
        self.uploads.progress(session_id).await
    }

    pub async fn missing_ranges(
        &self,
        session_id: &SessionId,
    ) -> BlobResult<Option<Vec<ByteRange>>> {
        self.uploads.missing(session_id).await
    }

    /// Abort a resumable upload and drop everything it received
    pub async fn delete_upload(&self, session_id: &SessionId) -> BlobResult<()> {
        self.uploads.delete(session_id).await
    }

    pub async fn purge_expired_uploads(&self) -> BlobResult<usize> {
        self.uploads.purge_expired().await
    }
}
