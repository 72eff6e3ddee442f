//! depot-axum: HTTP surface of the depot file repository.
//!
//! Exposes files (`/files`) and resumable upload sessions
//! (`/upload-sessions`) over axum, backed by a [`depot_blob::BlobAdapter`].

pub mod app;
mod body;
mod error;
pub mod files;
pub mod headers;
pub mod state;
pub mod upload_sessions;
pub mod views;

pub use app::{depot, DepotApp};
pub use error::DepotAxumError;
pub use state::DepotAxumState;
