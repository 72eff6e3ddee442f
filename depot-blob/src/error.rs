use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Not found: {id}")]
    NotFound { id: String },

    #[error("Already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Invalid media type: {message}")]
    InvalidMediaType { message: String },

    #[error("Invalid range: {message}")]
    InvalidRange { message: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Upload session expired: {session_id}")]
    SessionExpired { session_id: String },

    #[error("Internal error: {context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BlobError {
    /// Wrap any error as an internal failure, keeping it as the source
    pub fn internal<C, E>(context: C, error: E) -> Self
    where
        C: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an already exists error
    pub fn already_exists<S: Into<String>>(id: S) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    pub fn invalid_media_type<S: Into<String>>(message: S) -> Self {
        Self::InvalidMediaType {
            message: message.into(),
        }
    }

    pub fn invalid_range<S: Into<String>>(message: S) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn session_expired<S: Into<String>>(session_id: S) -> Self {
        Self::SessionExpired {
            session_id: session_id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for BlobError {
    fn from(source: std::io::Error) -> Self {
        Self::internal("I/O failure", source)
    }
}

impl From<serde_json::Error> for BlobError {
    fn from(source: serde_json::Error) -> Self {
        Self::internal("metadata serialization failure", source)
    }
}
