use std::time::Duration;

/// Default lifetime of an upload session (7 days)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for blob operations
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single blob (safety guard)
    pub max_blob_bytes: u64,

    /// Time after creation at which an unfinished upload session expires
    pub session_ttl: Duration,

    /// Rules for segmented uploads
    pub segment_rules: SegmentRules,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            session_ttl: DEFAULT_SESSION_TTL,
            segment_rules: SegmentRules::default(),
        }
    }
}

/// Rules for segments uploaded into a session
#[derive(Debug, Clone)]
pub struct SegmentRules {
    /// Upper bound for a single segment, protects staging space
    pub max_segment_bytes: u64,
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self {
            max_segment_bytes: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max blob size
    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    /// Set the upload session time-to-live
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set segment rules
    pub fn with_segment_rules(mut self, rules: SegmentRules) -> Self {
        self.segment_rules = rules;
        self
    }

    /// Session TTL as a chrono duration, saturating on overflow
    pub(crate) fn session_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::MAX)
    }
}

impl SegmentRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest accepted segment
    pub fn with_max_segment_bytes(mut self, bytes: u64) -> Self {
        self.max_segment_bytes = bytes;
        self
    }
}
