//! JSON shapes of the HTTP API.

use chrono::{DateTime, Utc};
use depot_blob::{ByteRange, FileRecord, SessionState, UploadProgress, UploadSession};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: String,
    pub name: Option<String>,
    pub media_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileRecord> for FileView {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id.0,
            name: record.name,
            media_type: record.media_type,
            size: record.size,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeView {
    pub from: u64,
    pub to: u64,
}

impl From<ByteRange> for RangeView {
    fn from(range: ByteRange) -> Self {
        Self {
            from: range.from,
            to: range.to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Active,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionView {
    pub id: String,
    pub file_id: String,
    pub file_name: Option<String>,
    pub status: SessionStatus,
    pub file_media_type: Option<String>,
    pub file_size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub received_bytes: u64,
    pub missing_ranges: Vec<RangeView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uploaded_file: Option<FileView>,
}

impl UploadSessionView {
    pub fn new(
        session: UploadSession,
        progress: UploadProgress,
        uploaded_file: Option<FileRecord>,
    ) -> Self {
        let status = match &session.state {
            SessionState::Open => SessionStatus::Open,
            SessionState::Active { .. } => SessionStatus::Active,
            SessionState::Finished { .. } => SessionStatus::Finished,
        };
        let finished_at = match &session.state {
            SessionState::Finished { finished_at, .. } => Some(*finished_at),
            _ => None,
        };

        Self {
            file_media_type: session.media_type().map(str::to_owned),
            file_size: session.total_length(),
            id: session.id.0,
            file_id: session.file_id.0,
            file_name: session.file_name,
            status,
            created_at: session.created_at,
            expires_at: session.expires_at,
            finished_at,
            received_bytes: progress.received_bytes,
            missing_ranges: progress.missing.into_iter().map(RangeView::from).collect(),
            uploaded_file: uploaded_file.map(FileView::from),
        }
    }
}

/// `POST /upload-sessions` body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadSession {
    pub file_name: Option<String>,
}

/// `PUT /files/{id}` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceFileMetadata {
    pub name: Option<String>,
    pub media_type: String,
}

/// `PATCH /files/{id}` body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFileMetadata {
    pub name: Option<String>,
    pub media_type: Option<String>,
}
