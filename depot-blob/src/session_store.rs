use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::store::{bytes_stream, collect_stream};
use crate::{
    BlobError, BlobResult, ByteRange, ByteStream, SessionId, StagedSegment, UploadSession,
    UploadSessionStore,
};

struct SessionEntry {
    session: UploadSession,
    segments: BTreeMap<ByteRange, Bytes>,
}

/// In-memory upload session store
#[derive(Clone, Default)]
pub struct MemoryUploadSessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    staged: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryUploadSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged segments not yet committed or discarded
    pub fn staged_len(&self) -> usize {
        self.staged.read().len()
    }
}

#[async_trait]
impl UploadSessionStore for MemoryUploadSessionStore {
    async fn create(&self, session: UploadSession) -> BlobResult<UploadSession> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(BlobError::already_exists(session.id.as_str()));
        }
        sessions.insert(
            session.id.clone(),
            SessionEntry {
                session: session.clone(),
                segments: BTreeMap::new(),
            },
        );
        Ok(session)
    }

    async fn get(&self, session_id: &SessionId) -> BlobResult<UploadSession> {
        self.sessions
            .read()
            .get(session_id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| BlobError::not_found(session_id.as_str()))
    }

    async fn list(&self) -> BlobResult<Vec<UploadSession>> {
        Ok(self
            .sessions
            .read()
            .values()
            .map(|entry| entry.session.clone())
            .collect())
    }

    async fn update(&self, session: UploadSession) -> BlobResult<UploadSession> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(&session.id)
            .ok_or_else(|| BlobError::not_found(session.id.as_str()))?;
        entry.session = session.clone();
        Ok(session)
    }

    async fn delete(&self, session_id: &SessionId) -> BlobResult<()> {
        self.sessions
            .write()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| BlobError::not_found(session_id.as_str()))
    }

    async fn stage_segment(
        &self,
        _session_id: &SessionId,
        body: ByteStream,
    ) -> BlobResult<StagedSegment> {
        let data = collect_stream(body).await?;
        let staged = StagedSegment {
            token: Uuid::new_v4().simple().to_string(),
            size: data.len() as u64,
        };
        self.staged.write().insert(staged.token.clone(), data);
        Ok(staged)
    }

    async fn commit_segment(
        &self,
        session_id: &SessionId,
        range: ByteRange,
        staged: StagedSegment,
    ) -> BlobResult<()> {
        let data = self
            .staged
            .write()
            .remove(&staged.token)
            .ok_or_else(|| BlobError::not_found(staged.token.clone()))?;

        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| BlobError::not_found(session_id.as_str()))?;
        if entry.segments.contains_key(&range) {
            return Err(BlobError::already_exists(format!("{}/{}", session_id, range)));
        }
        entry.segments.insert(range, data);
        Ok(())
    }

    async fn remove_segment(&self, session_id: &SessionId, range: ByteRange) -> BlobResult<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| BlobError::not_found(session_id.as_str()))?;
        entry.segments.remove(&range);
        Ok(())
    }

    async fn discard_segment(&self, staged: StagedSegment) {
        self.staged.write().remove(&staged.token);
    }

    async fn segments(&self, session_id: &SessionId) -> BlobResult<Vec<ByteRange>> {
        self.sessions
            .read()
            .get(session_id)
            .map(|entry| entry.segments.keys().copied().collect())
            .ok_or_else(|| BlobError::not_found(session_id.as_str()))
    }

    async fn open_segment(
        &self,
        session_id: &SessionId,
        range: ByteRange,
    ) -> BlobResult<ByteStream> {
        let data = self
            .sessions
            .read()
            .get(session_id)
            .and_then(|entry| entry.segments.get(&range).cloned())
            .ok_or_else(|| BlobError::not_found(format!("{}/{}", session_id, range)))?;
        Ok(bytes_stream(data))
    }

    async fn delete_segments(&self, session_id: &SessionId) -> BlobResult<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| BlobError::not_found(session_id.as_str()))?;
        entry.segments.clear();
        Ok(())
    }
}
