//! # depot-blob: content storage with resumable uploads and range delivery
//!
//! `depot-blob` is the storage core of the depot file repository. It stores
//! opaque binary files with a small metadata record, assembles files from
//! byte-range segments uploaded in any order, and serves stored payloads
//! whole or by byte range.
//!
//! ## Key Features
//!
//! - **Streaming-first**: payloads move as [`ByteStream`]s and are never buffered whole by the filesystem stores
//! - **Resumable uploads**: segments may arrive out of order, over many requests, and are validated against what is still missing
//! - **Range requests**: single `bytes=` ranges are served from seekable payloads
//! - **Storage agnostic**: filesystem and in-memory implementations of [`ContentStore`] and [`UploadSessionStore`]
//! - **Server agnostic**: no HTTP coupling, the HTTP surface lives in `depot-axum`
//!
//! ## Quick Start
//!
//! ```rust
//! use depot_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let adapter = BlobAdapter::new(
//!     MemoryContentStore::new(),
//!     MemoryUploadSessionStore::new(),
//!     BlobConfig::default(),
//! );
//!
//! let body = bytes_stream(bytes::Bytes::from_static(b"hello world"));
//! let record = adapter
//!     .put(FilePut::new("text/plain").with_name("hello.txt"), body)
//!     .await?;
//!
//! let opened = adapter.open(&record.id, Some("bytes=6-10")).await?;
//! assert!(opened.is_partial());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │      BlobAdapter     │  ← facade used by the HTTP layer
//! ├──────────┬───────────┤
//! │ Uploads  │  range    │  ← segment validation, assembly / range delivery
//! ├──────────┴───────────┤
//! │ ContentStore + Sess. │  ← storage primitives
//! └──────────────────────┘
//! ```

pub mod adapter;
mod config;
mod coordinator;
mod error;
mod fs_session_store;
mod fs_store;
mod memory_store;
pub mod range;
mod receipt;
pub mod segments;
mod session_store;
pub mod store;
mod sweeper;
mod types;
mod upload;

// Re-export main types for clean API
pub use adapter::{BlobAdapter, MetadataPatch};
pub use config::{BlobConfig, SegmentRules, DEFAULT_SESSION_TTL};
pub use coordinator::DefaultUploadCoordinator;
pub use error::{BlobError, BlobResult};
pub use fs_session_store::FsUploadSessionStore;
pub use fs_store::FsContentStore;
pub use memory_store::MemoryContentStore;
pub use receipt::{Delivery, OpenedBlob, ResolvedRange};
pub use session_store::MemoryUploadSessionStore;
pub use store::{bytes_stream, ContentStore, FilePut, Payload, PayloadBody, SeekableReader};
pub use sweeper::SessionSweeper;
pub use types::{
    ByteRange, ByteStream, FileId, FileRecord, SessionId, SessionState, UploadSession,
};
pub use upload::{
    SegmentUpload, StagedSegment, UploadCoordinator, UploadIntent, UploadProgress,
    UploadSessionStore,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        bytes_stream, BlobAdapter, BlobConfig, BlobError, BlobResult, ByteStream, ContentStore,
        FileId, FilePut, FileRecord, MemoryContentStore, MemoryUploadSessionStore, OpenedBlob,
        SegmentUpload, SessionId, UploadCoordinator, UploadSession,
    };
}
