use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{BlobResult, UploadCoordinator};

/// Background task reclaiming storage of expired upload sessions
pub struct SessionSweeper {
    uploads: Arc<dyn UploadCoordinator>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(uploads: Arc<dyn UploadCoordinator>, interval: Duration) -> Self {
        Self { uploads, interval }
    }

    /// Run forever, sweeping once per interval
    pub async fn start(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting upload session sweeper with interval: {:?}", self.interval);

        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok(0) => debug!("No expired upload sessions found"),
                Ok(purged) => info!("Removed {} expired upload sessions", purged),
                Err(e) => warn!("Error during upload session sweep: {}", e),
            }
        }
    }

    /// Run one sweep cycle
    pub async fn sweep(&self) -> BlobResult<usize> {
        self.uploads.purge_expired().await
    }

    /// Spawn onto the current runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.start())
    }
}
