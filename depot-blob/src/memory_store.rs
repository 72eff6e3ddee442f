use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;

use crate::store::{bytes_stream, collect_stream};
use crate::{
    BlobError, BlobResult, ByteStream, ContentStore, FileId, FilePut, FileRecord, Payload,
};

/// In-memory content store.
///
/// Payloads are buffered before the map is touched, so a record and its
/// bytes always appear together.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    files: Arc<RwLock<HashMap<FileId, (FileRecord, Bytes)>>>,
    forward_only: bool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve payloads as forward-only streams instead of seekable readers
    pub fn forward_only() -> Self {
        Self {
            forward_only: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn create_with_id(
        &self,
        id: FileId,
        put: FilePut,
        body: ByteStream,
    ) -> BlobResult<FileRecord> {
        put.validate()?;
        if self.files.read().contains_key(&id) {
            return Err(BlobError::already_exists(id.as_str()));
        }

        let data = collect_stream(body).await?;
        put.check_received(data.len() as u64)?;

        let record = FileRecord::new(id.clone(), put.name, put.media_type, data.len() as u64);
        let mut files = self.files.write();
        if files.contains_key(&id) {
            return Err(BlobError::already_exists(id.as_str()));
        }
        files.insert(id, (record.clone(), data));
        Ok(record)
    }

    async fn exists(&self, id: &FileId) -> BlobResult<bool> {
        Ok(self.files.read().contains_key(id))
    }

    async fn get_metadata(&self, id: &FileId) -> BlobResult<FileRecord> {
        self.files
            .read()
            .get(id)
            .map(|(record, _)| record.clone())
            .ok_or_else(|| BlobError::not_found(id.as_str()))
    }

    async fn get_payload(&self, id: &FileId) -> BlobResult<(Payload, FileRecord)> {
        let (record, data) = self
            .files
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| BlobError::not_found(id.as_str()))?;

        let length = data.len() as u64;
        let payload = if self.forward_only {
            Payload::stream(bytes_stream(data), length)
        } else {
            Payload::seekable(Cursor::new(data), length)
        };
        Ok((payload, record))
    }

    async fn list_all(&self) -> BlobResult<Vec<FileRecord>> {
        Ok(self
            .files
            .read()
            .values()
            .map(|(record, _)| record.clone())
            .collect())
    }

    async fn update_metadata(&self, record: FileRecord) -> BlobResult<FileRecord> {
        if record.media_type.trim().is_empty() {
            return Err(BlobError::invalid_media_type("media type must not be empty"));
        }
        let mut files = self.files.write();
        let (stored, _) = files
            .get_mut(&record.id)
            .ok_or_else(|| BlobError::not_found(record.id.as_str()))?;
        stored.name = record.name;
        stored.media_type = record.media_type;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn replace_payload(
        &self,
        id: &FileId,
        put: FilePut,
        body: ByteStream,
    ) -> BlobResult<FileRecord> {
        put.validate()?;
        if !self.files.read().contains_key(id) {
            return Err(BlobError::not_found(id.as_str()));
        }

        let data = collect_stream(body).await?;
        put.check_received(data.len() as u64)?;

        let mut files = self.files.write();
        let (record, stored) = files
            .get_mut(id)
            .ok_or_else(|| BlobError::not_found(id.as_str()))?;
        record.media_type = put.media_type;
        record.size = data.len() as u64;
        record.updated_at = Utc::now();
        *stored = data;
        Ok(record.clone())
    }

    async fn delete(&self, id: &FileId) -> BlobResult<()> {
        self.files
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BlobError::not_found(id.as_str()))
    }
}
