use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult, ByteRange, ByteStream, FileId, SessionId, UploadSession};

/// Coordinates resumable uploads delivered as byte-range segments
#[async_trait]
pub trait UploadCoordinator: Send + Sync {
    /// Create a session with the identifiers carried by `intent`.
    ///
    /// Fails with `AlreadyExists` if the session id is taken.
    async fn create(&self, intent: UploadIntent) -> BlobResult<UploadSession>;

    /// Begin a new session with freshly generated identifiers
    async fn begin(&self, file_name: Option<String>) -> BlobResult<UploadSession> {
        self.create(UploadIntent::new().with_optional_file_name(file_name))
            .await
    }

    /// Accept one segment. When it completes the file, the payload is
    /// assembled into the content store and the returned session is finished.
    async fn upload_segment(
        &self,
        session_id: &SessionId,
        segment: SegmentUpload,
        body: ByteStream,
    ) -> BlobResult<UploadSession>;

    /// Get a live session; `SessionExpired` once its deadline has passed
    async fn get(&self, session_id: &SessionId) -> BlobResult<UploadSession>;

    /// All sessions that have not expired
    async fn list(&self) -> BlobResult<Vec<UploadSession>>;

    /// Delete a session together with every segment it received
    async fn delete(&self, session_id: &SessionId) -> BlobResult<()>;

    /// Byte ranges the client still has to send.
    ///
    /// `None` while no segment has fixed the file length; empty once finished.
    async fn missing(&self, session_id: &SessionId) -> BlobResult<Option<Vec<ByteRange>>>;

    /// Received/missing summary of a session
    async fn progress(&self, session_id: &SessionId) -> BlobResult<UploadProgress>;

    /// Remove every expired, unfinished session. Returns how many were removed.
    async fn purge_expired(&self) -> BlobResult<usize>;
}

/// Identifiers for a new upload session
#[derive(Debug, Clone)]
pub struct UploadIntent {
    pub session_id: SessionId,
    /// Identifier the assembled file will be stored under
    pub file_id: FileId,
    pub file_name: Option<String>,
}

impl UploadIntent {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::new(),
            file_id: FileId::new(),
            file_name: None,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_file_id(mut self, file_id: FileId) -> Self {
        self.file_id = file_id;
        self
    }

    pub fn with_file_name<S: Into<String>>(mut self, file_name: S) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_optional_file_name(mut self, file_name: Option<String>) -> Self {
        self.file_name = file_name;
        self
    }
}

impl Default for UploadIntent {
    fn default() -> Self {
        Self::new()
    }
}

/// Description of one incoming segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUpload {
    pub media_type: String,
    pub from: u64,
    pub to: u64,
    pub total_length: u64,
}

impl SegmentUpload {
    pub fn new<S: Into<String>>(media_type: S, from: u64, to: u64, total_length: u64) -> Self {
        Self {
            media_type: media_type.into(),
            from,
            to,
            total_length,
        }
    }

    /// The segment as a range, checked against the declared total length
    pub fn range(&self) -> BlobResult<ByteRange> {
        let range = ByteRange::new(self.from, self.to)?;
        if range.to >= self.total_length {
            return Err(BlobError::invalid_range(format!(
                "segment {} lies outside a file of {} bytes",
                range, self.total_length
            )));
        }
        Ok(range)
    }
}

/// Received/missing summary of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub received_bytes: u64,
    /// Unknown until the first segment arrives
    pub total_length: Option<u64>,
    pub missing: Vec<ByteRange>,
}

/// Bytes written to a private staging slot, not yet part of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSegment {
    pub token: String,
    pub size: u64,
}

/// Persistence for upload sessions and their segments
#[async_trait]
pub trait UploadSessionStore: Send + Sync {
    /// Persist a new session; `AlreadyExists` if the id is taken
    async fn create(&self, session: UploadSession) -> BlobResult<UploadSession>;

    async fn get(&self, session_id: &SessionId) -> BlobResult<UploadSession>;

    async fn list(&self) -> BlobResult<Vec<UploadSession>>;

    /// Overwrite an existing session; `NotFound` if absent
    async fn update(&self, session: UploadSession) -> BlobResult<UploadSession>;

    /// Remove a session and all of its segments
    async fn delete(&self, session_id: &SessionId) -> BlobResult<()>;

    /// Write incoming segment bytes somewhere private
    async fn stage_segment(
        &self,
        session_id: &SessionId,
        body: ByteStream,
    ) -> BlobResult<StagedSegment>;

    /// Publish staged bytes as the segment `range` of the session.
    ///
    /// An existing segment is never overwritten (`AlreadyExists`). The staged
    /// bytes are consumed whether or not the commit succeeds.
    async fn commit_segment(
        &self,
        session_id: &SessionId,
        range: ByteRange,
        staged: StagedSegment,
    ) -> BlobResult<()>;

    /// Withdraw one committed segment; a missing segment is not an error
    async fn remove_segment(&self, session_id: &SessionId, range: ByteRange) -> BlobResult<()>;

    /// Drop staged bytes that will not be committed
    async fn discard_segment(&self, staged: StagedSegment);

    /// Ranges of the committed segments, in no particular order
    async fn segments(&self, session_id: &SessionId) -> BlobResult<Vec<ByteRange>>;

    async fn open_segment(&self, session_id: &SessionId, range: ByteRange)
        -> BlobResult<ByteStream>;

    /// Remove the committed segments but keep the session
    async fn delete_segments(&self, session_id: &SessionId) -> BlobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_must_fit_the_declared_length() {
        assert!(SegmentUpload::new("text/plain", 0, 9, 10).range().is_ok());
        assert!(matches!(
            SegmentUpload::new("text/plain", 5, 10, 10).range(),
            Err(BlobError::InvalidRange { .. })
        ));
        assert!(matches!(
            SegmentUpload::new("text/plain", 6, 5, 10).range(),
            Err(BlobError::InvalidRange { .. })
        ));
    }

    #[test]
    fn intent_generates_distinct_identifiers() {
        let a = UploadIntent::new();
        let b = UploadIntent::new().with_file_name("a.bin");
        assert_ne!(a.session_id, b.session_id);
        assert_ne!(a.file_id, b.file_id);
        assert_eq!(b.file_name.as_deref(), Some("a.bin"));
    }
}
