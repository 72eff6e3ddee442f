//! Filesystem content store.
//!
//! Layout under the root directory:
//!
//! ```text
//! files/<id>/content        payload bytes
//! files/<id>/metadata.json  serialized FileRecord
//! tmp/<token>/              staging area, renamed into place when complete
//! ```
//!
//! A file becomes visible by renaming a fully written staging directory into
//! `files/`, so a record is never observable without its payload. Payload
//! replacement renames the new content and metadata over the old ones while
//! holding the swap lock, restoring the old content if the metadata rename
//! fails; readers take the shared side of that lock while
//! opening both, so they see either the old pair or the new pair.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::store::copy_stream_to_file;
use crate::{
    BlobError, BlobResult, ByteStream, ContentStore, FileId, FilePut, FileRecord, Payload,
};

const CONTENT_FILE: &str = "content";
const METADATA_FILE: &str = "metadata.json";
const BACKUP_FILE: &str = "previous";

#[derive(Clone)]
pub struct FsContentStore {
    root: PathBuf,
    /// Held exclusively only while renaming files into place
    swap: Arc<RwLock<()>>,
    /// Serializes metadata read-modify-write cycles
    writers: Arc<Mutex<()>>,
}

impl FsContentStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open<P: AsRef<Path>>(root: P) -> BlobResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("files")).await?;
        fs::create_dir_all(root.join("tmp")).await?;

        Ok(Self {
            root,
            swap: Arc::new(RwLock::new(())),
            writers: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_dir(&self, id: &FileId) -> PathBuf {
        self.root.join("files").join(id.as_str())
    }

    fn new_staging_dir(&self) -> PathBuf {
        self.root
            .join("tmp")
            .join(format!("file-{}", Uuid::new_v4().simple()))
    }

    async fn read_record(dir: &Path, id: &FileId) -> BlobResult<FileRecord> {
        match fs::read(dir.join(METADATA_FILE)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(id.as_str())),
            Err(e) => Err(BlobError::internal(
                format!("reading metadata of file '{}'", id),
                e,
            )),
        }
    }

    async fn write_record(path: &Path, record: &FileRecord) -> BlobResult<()> {
        let raw = serde_json::to_vec_pretty(record)?;
        fs::write(path, raw).await?;
        Ok(())
    }

    /// Write the payload into `dir/content`, returning the byte count
    async fn stage_content(dir: &Path, put: &FilePut, body: ByteStream) -> BlobResult<u64> {
        fs::create_dir(dir).await?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(CONTENT_FILE))
            .await?;
        let written = copy_stream_to_file(body, &mut file).await?;
        put.check_received(written)?;
        Ok(written)
    }

    async fn discard(dir: &Path) {
        if let Err(e) = fs::remove_dir_all(dir).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %dir.display(), error = %e, "failed to remove staging directory");
            }
        }
    }

    /// Move staged content and metadata over `dir`.
    ///
    /// The previous content is kept as a hard link in `staging` until the
    /// metadata has followed, and is put back if it cannot.
    async fn swap_in(dir: &Path, staging: &Path) -> BlobResult<()> {
        let backup = staging.join(BACKUP_FILE);
        fs::hard_link(dir.join(CONTENT_FILE), &backup).await?;
        fs::rename(staging.join(CONTENT_FILE), dir.join(CONTENT_FILE)).await?;

        if let Err(e) = fs::rename(staging.join(METADATA_FILE), dir.join(METADATA_FILE)).await {
            if let Err(restore) = fs::rename(&backup, dir.join(CONTENT_FILE)).await {
                tracing::error!(path = %dir.display(), error = %restore, "failed to restore previous payload");
            }
            return Err(BlobError::internal(
                format!("swapping metadata in '{}'", dir.display()),
                e,
            ));
        }
        Ok(())
    }

    async fn publish(&self, id: &FileId, staging: &Path) -> BlobResult<()> {
        let target = self.file_dir(id);
        let _swap = self.swap.write().await;
        if fs::try_exists(&target).await? {
            return Err(BlobError::already_exists(id.as_str()));
        }
        fs::rename(staging, &target).await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn create_with_id(
        &self,
        id: FileId,
        put: FilePut,
        body: ByteStream,
    ) -> BlobResult<FileRecord> {
        put.validate()?;
        if fs::try_exists(self.file_dir(&id)).await? {
            return Err(BlobError::already_exists(id.as_str()));
        }

        let staging = self.new_staging_dir();
        let result = async {
            let size = Self::stage_content(&staging, &put, body).await?;
            let record = FileRecord::new(id.clone(), put.name.clone(), put.media_type.clone(), size);
            Self::write_record(&staging.join(METADATA_FILE), &record).await?;
            self.publish(&id, &staging).await?;
            Ok::<_, BlobError>(record)
        }
        .await;

        match result {
            Ok(record) => {
                tracing::info!(file_id = %id, size = record.size, media_type = %record.media_type, "file created");
                Ok(record)
            }
            Err(e) => {
                Self::discard(&staging).await;
                Err(e)
            }
        }
    }

    async fn exists(&self, id: &FileId) -> BlobResult<bool> {
        Ok(fs::try_exists(self.file_dir(id).join(METADATA_FILE)).await?)
    }

    async fn get_metadata(&self, id: &FileId) -> BlobResult<FileRecord> {
        let _swap = self.swap.read().await;
        Self::read_record(&self.file_dir(id), id).await
    }

    async fn get_payload(&self, id: &FileId) -> BlobResult<(Payload, FileRecord)> {
        let dir = self.file_dir(id);
        let _swap = self.swap.read().await;

        let record = Self::read_record(&dir, id).await?;
        let file = match fs::File::open(dir.join(CONTENT_FILE)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobError::not_found(id.as_str()))
            }
            Err(e) => return Err(BlobError::internal(format!("opening file '{}'", id), e)),
        };
        let length = file.metadata().await?.len();

        Ok((Payload::seekable(file, length), record))
    }

    async fn list_all(&self) -> BlobResult<Vec<FileRecord>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(self.root.join("files")).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let id = FileId(name);
            match Self::read_record(&entry.path(), &id).await {
                Ok(record) => records.push(record),
                // deleted between listing and reading
                Err(BlobError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    async fn update_metadata(&self, record: FileRecord) -> BlobResult<FileRecord> {
        if record.media_type.trim().is_empty() {
            return Err(BlobError::invalid_media_type("media type must not be empty"));
        }

        let dir = self.file_dir(&record.id);
        let _writer = self.writers.lock().await;

        let mut stored = Self::read_record(&dir, &record.id).await?;
        stored.name = record.name;
        stored.media_type = record.media_type;
        stored.updated_at = Utc::now();

        let staged = dir.join(format!("{}.{}", METADATA_FILE, Uuid::new_v4().simple()));
        Self::write_record(&staged, &stored).await?;
        {
            let _swap = self.swap.write().await;
            if let Err(e) = fs::rename(&staged, dir.join(METADATA_FILE)).await {
                let _ = fs::remove_file(&staged).await;
                return Err(e.into());
            }
        }

        Ok(stored)
    }

    async fn replace_payload(
        &self,
        id: &FileId,
        put: FilePut,
        body: ByteStream,
    ) -> BlobResult<FileRecord> {
        put.validate()?;
        let dir = self.file_dir(id);
        if !fs::try_exists(dir.join(METADATA_FILE)).await? {
            return Err(BlobError::not_found(id.as_str()));
        }

        let staging = self.new_staging_dir();
        let result = async {
            let size = Self::stage_content(&staging, &put, body).await?;

            let _writer = self.writers.lock().await;
            let mut record = Self::read_record(&dir, id).await?;
            record.media_type = put.media_type.clone();
            record.size = size;
            record.updated_at = Utc::now();
            Self::write_record(&staging.join(METADATA_FILE), &record).await?;

            let _swap = self.swap.write().await;
            Self::swap_in(&dir, &staging).await?;
            Ok::<_, BlobError>(record)
        }
        .await;

        Self::discard(&staging).await;
        if let Ok(record) = &result {
            tracing::info!(file_id = %id, size = record.size, "file payload replaced");
        }
        result
    }

    async fn delete(&self, id: &FileId) -> BlobResult<()> {
        let dir = self.file_dir(id);
        let trash = self.new_staging_dir();
        {
            let _writer = self.writers.lock().await;
            let _swap = self.swap.write().await;
            if !fs::try_exists(dir.join(METADATA_FILE)).await? {
                return Err(BlobError::not_found(id.as_str()));
            }
            fs::rename(&dir, &trash).await?;
        }

        Self::discard(&trash).await;
        tracing::info!(file_id = %id, "file deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_metadata_swap_restores_previous_content() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("file");
        let staging = root.path().join("staging");
        fs::create_dir(&dir).await.unwrap();
        fs::create_dir(&staging).await.unwrap();
        fs::write(dir.join(CONTENT_FILE), b"old").await.unwrap();
        fs::write(dir.join(METADATA_FILE), b"{}").await.unwrap();
        // no staged metadata, so the second rename fails
        fs::write(staging.join(CONTENT_FILE), b"new payload").await.unwrap();

        let result = FsContentStore::swap_in(&dir, &staging).await;

        assert!(matches!(result, Err(BlobError::Internal { .. })));
        assert_eq!(fs::read(dir.join(CONTENT_FILE)).await.unwrap(), b"old");
        assert_eq!(fs::read(dir.join(METADATA_FILE)).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn swap_moves_content_and_metadata_together() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("file");
        let staging = root.path().join("staging");
        fs::create_dir(&dir).await.unwrap();
        fs::create_dir(&staging).await.unwrap();
        fs::write(dir.join(CONTENT_FILE), b"old").await.unwrap();
        fs::write(dir.join(METADATA_FILE), b"{}").await.unwrap();
        fs::write(staging.join(CONTENT_FILE), b"new").await.unwrap();
        fs::write(staging.join(METADATA_FILE), b"{\"v\":2}").await.unwrap();

        FsContentStore::swap_in(&dir, &staging).await.unwrap();

        assert_eq!(fs::read(dir.join(CONTENT_FILE)).await.unwrap(), b"new");
        assert_eq!(fs::read(dir.join(METADATA_FILE)).await.unwrap(), b"{\"v\":2}");
        assert_eq!(fs::read(staging.join(BACKUP_FILE)).await.unwrap(), b"old");
    }
}
