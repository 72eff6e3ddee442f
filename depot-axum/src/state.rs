use std::sync::Arc;

use depot_blob::BlobAdapter;

/// Shared handler state
#[derive(Clone)]
pub struct DepotAxumState {
    pub blobs: Arc<BlobAdapter>,
}

impl DepotAxumState {
    pub fn new(blobs: BlobAdapter) -> Self {
        Self {
            blobs: Arc::new(blobs),
        }
    }

    pub fn from_shared(blobs: Arc<BlobAdapter>) -> Self {
        Self { blobs }
    }
}
