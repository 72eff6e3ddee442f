//! Filesystem upload session store.
//!
//! ```text
//! sessions/<id>/metadata.json        serialized UploadSession
//! sessions/<id>/segment-<from>-<to>  bytes of one accepted segment
//! tmp/                               staged segments and new sessions
//! ```
//!
//! Segments are published with a hard link, which refuses to replace an
//! existing segment file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::store::copy_stream_to_file;
use crate::{
    BlobError, BlobResult, ByteRange, ByteStream, SessionId, StagedSegment, UploadSession,
    UploadSessionStore,
};

const METADATA_FILE: &str = "metadata.json";
const SEGMENT_PREFIX: &str = "segment-";

#[derive(Clone)]
pub struct FsUploadSessionStore {
    root: PathBuf,
    /// Serializes the exists-check and rename of session creation
    creating: Arc<Mutex<()>>,
}

fn segment_file_name(range: &ByteRange) -> String {
    format!("{}{}-{}", SEGMENT_PREFIX, range.from, range.to)
}

fn parse_segment_file_name(name: &str) -> Option<ByteRange> {
    let (from, to) = name.strip_prefix(SEGMENT_PREFIX)?.split_once('-')?;
    ByteRange::new(from.parse().ok()?, to.parse().ok()?).ok()
}

impl FsUploadSessionStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open<P: AsRef<Path>>(root: P) -> BlobResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("sessions")).await?;
        fs::create_dir_all(root.join("tmp")).await?;

        Ok(Self {
            root,
            creating: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join("sessions").join(id.as_str())
    }

    fn tmp_path(&self, prefix: &str) -> PathBuf {
        self.root
            .join("tmp")
            .join(format!("{}-{}", prefix, Uuid::new_v4().simple()))
    }

    fn staged_path(&self, staged: &StagedSegment) -> PathBuf {
        self.root.join("tmp").join(&staged.token)
    }

    async fn read_session(dir: &Path, id: &SessionId) -> BlobResult<UploadSession> {
        match fs::read(dir.join(METADATA_FILE)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(id.as_str())),
            Err(e) => Err(BlobError::internal(
                format!("reading upload session '{}'", id),
                e,
            )),
        }
    }

    async fn write_session(path: &Path, session: &UploadSession) -> BlobResult<()> {
        let raw = serde_json::to_vec_pretty(session)?;
        fs::write(path, raw).await?;
        Ok(())
    }

    async fn remove_quietly(path: &Path) {
        let result = match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
            Ok(_) => fs::remove_file(path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary data");
            }
        }
    }

    async fn require_session(&self, id: &SessionId) -> BlobResult<PathBuf> {
        let dir = self.session_dir(id);
        if !fs::try_exists(dir.join(METADATA_FILE)).await? {
            return Err(BlobError::not_found(id.as_str()));
        }
        Ok(dir)
    }
}

#[async_trait]
impl UploadSessionStore for FsUploadSessionStore {
    async fn create(&self, session: UploadSession) -> BlobResult<UploadSession> {
        let staging = self.tmp_path("session");
        let result = async {
            fs::create_dir(&staging).await?;
            Self::write_session(&staging.join(METADATA_FILE), &session).await?;

            let target = self.session_dir(&session.id);
            let _creating = self.creating.lock().await;
            if fs::try_exists(&target).await? {
                return Err(BlobError::already_exists(session.id.as_str()));
            }
            fs::rename(&staging, &target).await?;
            Ok::<_, BlobError>(())
        }
        .await;

        if let Err(e) = result {
            Self::remove_quietly(&staging).await;
            return Err(e);
        }
        Ok(session)
    }

    async fn get(&self, session_id: &SessionId) -> BlobResult<UploadSession> {
        Self::read_session(&self.session_dir(session_id), session_id).await
    }

    async fn list(&self) -> BlobResult<Vec<UploadSession>> {
        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(self.root.join("sessions")).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match Self::read_session(&entry.path(), &SessionId(name)).await {
                Ok(session) => sessions.push(session),
                Err(BlobError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(sessions)
    }

    async fn update(&self, session: UploadSession) -> BlobResult<UploadSession> {
        let dir = self.require_session(&session.id).await?;
        let staged = dir.join(format!("{}.{}", METADATA_FILE, Uuid::new_v4().simple()));

        Self::write_session(&staged, &session).await?;
        if let Err(e) = fs::rename(&staged, dir.join(METADATA_FILE)).await {
            Self::remove_quietly(&staged).await;
            return Err(e.into());
        }
        Ok(session)
    }

    async fn delete(&self, session_id: &SessionId) -> BlobResult<()> {
        let dir = self.require_session(session_id).await?;
        let trash = self.tmp_path("trash");
        match fs::rename(&dir, &trash).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobError::not_found(session_id.as_str()))
            }
            Err(e) => return Err(e.into()),
        }
        Self::remove_quietly(&trash).await;
        Ok(())
    }

    async fn stage_segment(
        &self,
        session_id: &SessionId,
        body: ByteStream,
    ) -> BlobResult<StagedSegment> {
        let path = self.tmp_path("segment");
        let token = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .unwrap_or_default();

        let result = async {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            copy_stream_to_file(body, &mut file).await
        }
        .await;

        match result {
            Ok(size) => Ok(StagedSegment { token, size }),
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "segment staging failed");
                Self::remove_quietly(&path).await;
                Err(e)
            }
        }
    }

    async fn commit_segment(
        &self,
        session_id: &SessionId,
        range: ByteRange,
        staged: StagedSegment,
    ) -> BlobResult<()> {
        let source = self.staged_path(&staged);
        let result = async {
            let dir = self.require_session(session_id).await?;
            match fs::hard_link(&source, dir.join(segment_file_name(&range))).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(BlobError::already_exists(
                    format!("{}/{}", session_id, range),
                )),
                Err(e) => Err(BlobError::internal(
                    format!("committing segment {} of session '{}'", range, session_id),
                    e,
                )),
            }
        }
        .await;

        Self::remove_quietly(&source).await;
        result
    }

    async fn remove_segment(&self, session_id: &SessionId, range: ByteRange) -> BlobResult<()> {
        let dir = self.require_session(session_id).await?;
        match fs::remove_file(dir.join(segment_file_name(&range))).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn discard_segment(&self, staged: StagedSegment) {
        Self::remove_quietly(&self.staged_path(&staged)).await;
    }

    async fn segments(&self, session_id: &SessionId) -> BlobResult<Vec<ByteRange>> {
        let dir = self.require_session(session_id).await?;
        let mut ranges = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Some(range) = entry.file_name().to_str().and_then(parse_segment_file_name) {
                ranges.push(range);
            }
        }

        Ok(ranges)
    }

    async fn open_segment(
        &self,
        session_id: &SessionId,
        range: ByteRange,
    ) -> BlobResult<ByteStream> {
        let path = self.session_dir(session_id).join(segment_file_name(&range));
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(ReaderStream::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(format!(
                "{}/{}",
                session_id, range
            ))),
            Err(e) => Err(BlobError::internal(
                format!("opening segment {} of session '{}'", range, session_id),
                e,
            )),
        }
    }

    async fn delete_segments(&self, session_id: &SessionId) -> BlobResult<()> {
        let dir = self.require_session(session_id).await?;
        for range in self.segments(session_id).await? {
            match fs::remove_file(dir.join(segment_file_name(&range))).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_file_names_round_trip() {
        let range = ByteRange::new(5, 9).unwrap();
        assert_eq!(segment_file_name(&range), "segment-5-9");
        assert_eq!(parse_segment_file_name("segment-5-9"), Some(range));
        assert_eq!(parse_segment_file_name("metadata.json"), None);
        assert_eq!(parse_segment_file_name("segment-9-5"), None);
    }
}
