use anyhow::Result;
use depot_axum::depot;
use depot_blob::{BlobAdapter, FsContentStore, FsUploadSessionStore, SessionSweeper};
use tracing_subscriber::EnvFilter;

mod settings;

use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if settings.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let content = FsContentStore::open(settings.files_dir()).await?;
    let sessions = FsUploadSessionStore::open(settings.uploads_dir()).await?;
    let blobs = BlobAdapter::new(content, sessions, settings.blob_config());

    match settings.sweep_interval {
        Some(interval) => {
            SessionSweeper::new(blobs.uploads().clone(), interval).spawn();
        }
        None => tracing::info!("upload session sweeper disabled"),
    }

    let mut app = depot(blobs);
    if let Some(limit) = settings.max_body_bytes {
        app = app.with_body_limit(limit);
    }

    tracing::info!(data_dir = %settings.data_dir.display(), "[depot] listening on http://{}", settings.addr());

    app.listen(settings.addr()).await?;

    Ok(())
}
