use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::segments::{is_acceptable, missing_ranges, received_bytes};
use crate::types::media_type_essence;
use crate::store::limit_stream;
use crate::{
    BlobConfig, BlobError, BlobResult, ByteRange, ByteStream, ContentStore, FilePut,
    SegmentUpload, SessionId, SessionState, StagedSegment, UploadCoordinator, UploadIntent,
    UploadProgress, UploadSession, UploadSessionStore,
};

/// Upload coordinator that stages segments in an [`UploadSessionStore`] and
/// assembles them into a [`ContentStore`] once nothing is missing.
///
/// Segment bytes are staged before the per-session lock is taken; validation,
/// commit and assembly run under it.
pub struct DefaultUploadCoordinator {
    content: Arc<dyn ContentStore>,
    sessions: Arc<dyn UploadSessionStore>,
    config: BlobConfig,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl DefaultUploadCoordinator {
    pub fn new<C, S>(content: C, sessions: S, config: BlobConfig) -> Self
    where
        C: ContentStore + 'static,
        S: UploadSessionStore + 'static,
    {
        Self::from_shared(Arc::new(content), Arc::new(sessions), config)
    }

    /// Build over stores that are shared with other components
    pub fn from_shared(
        content: Arc<dyn ContentStore>,
        sessions: Arc<dyn UploadSessionStore>,
        config: BlobConfig,
    ) -> Self {
        Self {
            content,
            sessions,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        self.locks.entry(session_id.clone()).or_default().clone()
    }

    /// Forget the lock of a session that will accept no more segments
    fn release_lock(&self, session_id: &SessionId) {
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn load_live(&self, session_id: &SessionId) -> BlobResult<UploadSession> {
        let session = self.sessions.get(session_id).await?;
        if session.is_expired(Utc::now()) {
            return Err(BlobError::session_expired(session_id.as_str()));
        }
        Ok(session)
    }

    /// Checks that only depend on the session state and the segment header
    fn check_segment(
        &self,
        session: &UploadSession,
        segment: &SegmentUpload,
    ) -> BlobResult<ByteRange> {
        if session.is_finished() {
            return Err(BlobError::invalid_range(format!(
                "upload session '{}' is already complete",
                session.id
            )));
        }

        let range = segment.range()?;
        let media_type = media_type_essence(&segment.media_type);
        if media_type.is_empty() {
            return Err(BlobError::invalid_media_type("media type must not be empty"));
        }
        if segment.total_length > self.config.max_blob_bytes {
            return Err(BlobError::invalid_range(format!(
                "total length {} exceeds the maximum of {} bytes",
                segment.total_length, self.config.max_blob_bytes
            )));
        }
        if range.len() > self.config.segment_rules.max_segment_bytes {
            return Err(BlobError::invalid_range(format!(
                "segment of {} bytes exceeds the maximum of {} bytes",
                range.len(),
                self.config.segment_rules.max_segment_bytes
            )));
        }

        if let Some(fixed) = session.media_type() {
            if fixed != media_type {
                return Err(BlobError::invalid_media_type(format!(
                    "session expects '{}', segment declares '{}'",
                    fixed, segment.media_type
                )));
            }
        }
        if let Some(total_length) = session.total_length() {
            if total_length != segment.total_length {
                return Err(BlobError::invalid_range(format!(
                    "session expects {} bytes, segment declares {}",
                    total_length, segment.total_length
                )));
            }
        }

        Ok(range)
    }

    async fn check_acceptable(
        &self,
        session: &UploadSession,
        range: ByteRange,
        total_length: u64,
    ) -> BlobResult<()> {
        let received = self.sessions.segments(&session.id).await?;
        let missing = missing_ranges(&received, total_length);
        if !is_acceptable(&range, &missing) {
            return Err(BlobError::invalid_range(format!(
                "segment {} overlaps bytes already received",
                range
            )));
        }
        Ok(())
    }

    /// Re-validate under the session lock and fix the file shape on the first segment
    async fn prepare_locked(
        &self,
        session_id: &SessionId,
        segment: &SegmentUpload,
    ) -> BlobResult<(UploadSession, ByteRange)> {
        let mut session = self.load_live(session_id).await?;
        let range = self.check_segment(&session, segment)?;

        if matches!(session.state, SessionState::Open) {
            session.state = SessionState::Active {
                media_type: media_type_essence(&segment.media_type),
                total_length: segment.total_length,
            };
            session = self.sessions.update(session).await?;
            debug!(session_id = %session_id, total_length = segment.total_length, "upload session activated");
        }

        self.check_acceptable(&session, range, segment.total_length)
            .await?;
        Ok((session, range))
    }

    async fn commit_locked(
        &self,
        session_id: &SessionId,
        segment: &SegmentUpload,
        staged: StagedSegment,
    ) -> BlobResult<UploadSession> {
        let (session, range) = match self.prepare_locked(session_id, segment).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.sessions.discard_segment(staged).await;
                return Err(e);
            }
        };

        self.sessions
            .commit_segment(session_id, range, staged)
            .await?;
        debug!(session_id = %session_id, range = %range, "segment committed");

        match self.finish_if_complete(session).await {
            Ok(session) => Ok(session),
            Err(e) => {
                // the segment goes back to missing so a resend retries assembly
                if let Err(cleanup) = self.sessions.remove_segment(session_id, range).await {
                    error!(session_id = %session_id, range = %range, error = %cleanup, "failed to withdraw segment after failed assembly");
                }
                Err(e)
            }
        }
    }

    async fn finish_if_complete(&self, session: UploadSession) -> BlobResult<UploadSession> {
        let Some(total_length) = session.total_length() else {
            return Ok(session);
        };
        let mut received = self.sessions.segments(&session.id).await?;
        if !missing_ranges(&received, total_length).is_empty() {
            return Ok(session);
        }

        received.sort_by_key(|range| range.from);
        self.assemble(session, total_length, received).await
    }

    async fn assemble(
        &self,
        mut session: UploadSession,
        total_length: u64,
        segments: Vec<ByteRange>,
    ) -> BlobResult<UploadSession> {
        let media_type = session.media_type().unwrap_or_default().to_string();
        let put = FilePut::new(media_type.clone())
            .with_optional_name(session.file_name.clone())
            .with_size_hint(total_length);

        let body = self.concat_segments(session.id.clone(), segments);
        let record = self
            .content
            .create_with_id(session.file_id.clone(), put, body)
            .await?;

        session.state = SessionState::Finished {
            media_type,
            total_length,
            finished_at: Utc::now(),
        };
        let session = match self.sessions.update(session).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(rollback) = self.content.delete(&record.id).await {
                    error!(file_id = %record.id, error = %rollback, "failed to roll back assembled file");
                }
                return Err(e);
            }
        };

        if let Err(e) = self.sessions.delete_segments(&session.id).await {
            warn!(session_id = %session.id, error = %e, "failed to remove segments of finished session");
        }

        info!(session_id = %session.id, file_id = %record.id, size = record.size, "upload session finished");
        Ok(session)
    }

    /// Concatenate committed segments, in the given order, into a single stream
    fn concat_segments(&self, session_id: SessionId, ranges: Vec<ByteRange>) -> ByteStream {
        let sessions = self.sessions.clone();
        let stream = async_stream::stream! {
            for range in ranges {
                match sessions.open_segment(&session_id, range).await {
                    Ok(mut segment) => {
                        while let Some(chunk) = StreamExt::next(&mut segment).await {
                            yield chunk;
                        }
                    }
                    Err(e) => {
                        yield Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("failed to read segment {}: {}", range, e),
                        ));
                        return;
                    }
                }
            }
        };
        Box::pin(stream)
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl UploadCoordinator for DefaultUploadCoordinator {
    #[instrument(skip(self, intent), fields(session_id = %intent.session_id, file_id = %intent.file_id))]
    async fn create(&self, intent: UploadIntent) -> BlobResult<UploadSession> {
        if self.content.exists(&intent.file_id).await? {
            return Err(BlobError::already_exists(intent.file_id.as_str()));
        }

        let now = Utc::now();
        let session = UploadSession::new(
            intent.session_id,
            intent.file_id,
            intent.file_name,
            now,
            expiry_after(now, self.config.session_ttl_chrono()),
        );
        let session = self.sessions.create(session).await?;
        info!(expires_at = %session.expires_at, "upload session created");
        Ok(session)
    }

    #[instrument(skip(self, session_id, segment, body), fields(session_id = %session_id, from = segment.from, to = segment.to, total_length = segment.total_length))]
    async fn upload_segment(
        &self,
        session_id: &SessionId,
        segment: SegmentUpload,
        body: ByteStream,
    ) -> BlobResult<UploadSession> {
        // Cheap rejection before any bytes are read
        let session = self.load_live(session_id).await?;
        let range = self.check_segment(&session, &segment)?;
        let total_length = session.total_length().unwrap_or(segment.total_length);
        self.check_acceptable(&session, range, total_length).await?;

        let staged = match self
            .sessions
            .stage_segment(session_id, limit_stream(body, range.len()))
            .await
        {
            Ok(staged) => staged,
            Err(BlobError::Invalid { message }) => return Err(BlobError::invalid_range(message)),
            Err(e) => return Err(e),
        };
        if staged.size != range.len() {
            let size = staged.size;
            self.sessions.discard_segment(staged).await;
            return Err(BlobError::invalid_range(format!(
                "segment {} declares {} bytes but {} were received",
                range,
                range.len(),
                size
            )));
        }

        let lock = self.session_lock(session_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.commit_locked(session_id, &segment, staged).await
        };
        drop(lock);

        if matches!(&outcome, Ok(session) if session.is_finished()) {
            self.release_lock(session_id);
        }
        outcome
    }

    async fn get(&self, session_id: &SessionId) -> BlobResult<UploadSession> {
        self.load_live(session_id).await
    }

    async fn list(&self) -> BlobResult<Vec<UploadSession>> {
        let now = Utc::now();
        let mut sessions: Vec<_> = self
            .sessions
            .list()
            .await?
            .into_iter()
            .filter(|session| !session.is_expired(now))
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    #[instrument(skip(self, session_id), fields(session_id = %session_id))]
    async fn delete(&self, session_id: &SessionId) -> BlobResult<()> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.sessions.delete(session_id).await
        };
        drop(lock);
        self.release_lock(session_id);

        result?;
        info!("upload session deleted");
        Ok(())
    }

    async fn missing(&self, session_id: &SessionId) -> BlobResult<Option<Vec<ByteRange>>> {
        let session = self.load_live(session_id).await?;
        match session.state {
            SessionState::Open => Ok(None),
            SessionState::Active { total_length, .. } => {
                let received = self.sessions.segments(session_id).await?;
                Ok(Some(missing_ranges(&received, total_length)))
            }
            SessionState::Finished { .. } => Ok(Some(Vec::new())),
        }
    }

    async fn progress(&self, session_id: &SessionId) -> BlobResult<UploadProgress> {
        let session = self.load_live(session_id).await?;
        let progress = match session.state {
            SessionState::Open => UploadProgress {
                received_bytes: 0,
                total_length: None,
                missing: Vec::new(),
            },
            SessionState::Active { total_length, .. } => {
                let received = self.sessions.segments(session_id).await?;
                UploadProgress {
                    received_bytes: received_bytes(&received),
                    total_length: Some(total_length),
                    missing: missing_ranges(&received, total_length),
                }
            }
            SessionState::Finished { total_length, .. } => UploadProgress {
                received_bytes: total_length,
                total_length: Some(total_length),
                missing: Vec::new(),
            },
        };
        Ok(progress)
    }

    async fn purge_expired(&self) -> BlobResult<usize> {
        let now = Utc::now();
        let expired: Vec<_> = self
            .sessions
            .list()
            .await?
            .into_iter()
            .filter(|session| session.is_expired(now))
            .map(|session| session.id)
            .collect();

        let mut purged = 0;
        for session_id in expired {
            let lock = self.session_lock(&session_id);
            let result = {
                let _guard = lock.lock().await;
                match self.sessions.get(&session_id).await {
                    Ok(session) if session.is_expired(Utc::now()) => {
                        self.sessions.delete(&session_id).await.map(|_| true)
                    }
                    Ok(_) => Ok(false),
                    Err(BlobError::NotFound { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            };
            drop(lock);
            self.release_lock(&session_id);

            match result {
                Ok(true) => {
                    debug!(session_id = %session_id, "expired upload session removed");
                    purged += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "failed to remove expired upload session")
                }
            }
        }

        if purged > 0 {
            info!(purged, "expired upload sessions removed");
        }
        Ok(purged)
    }
}
