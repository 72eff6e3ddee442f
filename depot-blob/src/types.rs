use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Random lowercase hex token used for every server generated identifier
fn random_hex() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Identifiers end up as directory names, so anything that could escape the
/// store root is refused.
fn is_safe_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Media type without parameters, lowercased: `Text/Plain; charset=utf-8` is `text/plain`
pub fn media_type_essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Unique identifier for a stored file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    /// Generate a new random file ID
    pub fn new() -> Self {
        Self(random_hex())
    }

    /// Create from an existing string, rejecting values unusable as storage keys
    pub fn parse<S: Into<String>>(id: S) -> BlobResult<Self> {
        let id = id.into();
        if !is_safe_identifier(&id) {
            return Err(BlobError::not_found(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(random_hex())
    }

    /// Create from an existing string, rejecting values unusable as storage keys
    pub fn parse<S: Into<String>>(id: S) -> BlobResult<Self> {
        let id = id.into();
        if !is_safe_identifier(&id) {
            return Err(BlobError::not_found(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive byte interval `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub from: u64,
    pub to: u64,
}

impl ByteRange {
    /// Build a range; `from` must not exceed `to`
    pub fn new(from: u64, to: u64) -> BlobResult<Self> {
        if from > to {
            return Err(BlobError::invalid_range(format!(
                "range start {} is after range end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// An inclusive range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if `other` lies entirely inside this range
    pub fn contains(&self, other: &ByteRange) -> bool {
        self.from <= other.from && self.to >= other.to
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Metadata of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub name: Option<String>,
    pub media_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(id: FileId, name: Option<String>, media_type: String, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            media_type,
            size,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle of an upload session.
///
/// The media type and total length are unknown until the first segment
/// arrives and fixed from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no segment received yet
    Open,
    /// At least one segment accepted
    Active { media_type: String, total_length: u64 },
    /// All bytes received and assembled into the content store
    Finished {
        media_type: String,
        total_length: u64,
        finished_at: DateTime<Utc>,
    },
}

/// Upload session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: SessionId,
    pub file_id: FileId,
    pub file_name: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        id: SessionId,
        file_id: FileId,
        file_name: Option<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            file_id,
            file_name,
            state: SessionState::Open,
            created_at,
            expires_at,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Finished { .. })
    }

    /// Finished sessions never expire: their file already lives in the content store
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_finished() && now > self.expires_at
    }

    /// Media type fixed by the first segment
    pub fn media_type(&self) -> Option<&str> {
        match &self.state {
            SessionState::Open => None,
            SessionState::Active { media_type, .. } | SessionState::Finished { media_type, .. } => {
                Some(media_type)
            }
        }
    }

    /// Total length fixed by the first segment
    pub fn total_length(&self) -> Option<u64> {
        match &self.state {
            SessionState::Open => None,
            SessionState::Active { total_length, .. }
            | SessionState::Finished { total_length, .. } => Some(*total_length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_parameters_are_ignored() {
        assert_eq!(media_type_essence("text/plain"), "text/plain");
        assert_eq!(media_type_essence("Text/Plain; charset=utf-8"), "text/plain");
        assert_eq!(media_type_essence(" ; charset=utf-8"), "");
    }

    #[test]
    fn generated_ids_are_lowercase_hex() {
        let id = FileId::new();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn path_like_ids_are_refused() {
        assert!(FileId::parse("../etc").is_err());
        assert!(SessionId::parse("a/b").is_err());
        assert!(SessionId::parse("").is_err());
        assert!(FileId::parse("abc_123-x").is_ok());
    }

    #[test]
    fn byte_range_geometry() {
        let r = ByteRange::new(5, 9).unwrap();
        assert_eq!(r.len(), 5);
        assert!(r.contains(&ByteRange::new(6, 9).unwrap()));
        assert!(!r.contains(&ByteRange::new(4, 6).unwrap()));
        assert!(r.overlaps(&ByteRange::new(0, 5).unwrap()));
        assert!(!r.overlaps(&ByteRange::new(0, 4).unwrap()));
        assert!(ByteRange::new(3, 2).is_err());
    }

    #[test]
    fn finished_sessions_do_not_expire() {
        let now = Utc::now();
        let mut session = UploadSession::new(
            SessionId::new(),
            FileId::new(),
            None,
            now - chrono::Duration::days(10),
            now - chrono::Duration::days(3),
        );
        assert!(session.is_expired(now));

        session.state = SessionState::Finished {
            media_type: "text/plain".into(),
            total_length: 3,
            finished_at: now,
        };
        assert!(!session.is_expired(now));
        assert_eq!(session.total_length(), Some(3));
    }
}
