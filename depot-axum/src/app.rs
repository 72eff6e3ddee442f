use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use depot_blob::BlobAdapter;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::{files, upload_sessions, DepotAxumState};

/// The depot HTTP application
#[derive(Clone)]
pub struct DepotApp {
    pub state: DepotAxumState,
    max_body_bytes: Option<usize>,
}

impl DepotApp {
    pub fn new(blobs: BlobAdapter) -> Self {
        Self::from_shared(Arc::new(blobs))
    }

    pub fn from_shared(blobs: Arc<BlobAdapter>) -> Self {
        Self {
            state: DepotAxumState::from_shared(blobs),
            max_body_bytes: None,
        }
    }

    /// Reject request bodies larger than `bytes` with 413
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.max_body_bytes = Some(bytes);
        self
    }

    pub fn blobs(&self) -> &Arc<BlobAdapter> {
        &self.state.blobs
    }

    /// Build the router with tracing and request id layers applied
    pub fn router(&self) -> Router<()> {
        let mut router = Router::new()
            .route("/health", get(health))
            .nest("/files", files::router())
            .nest("/upload-sessions", upload_sessions::router())
            .with_state(self.state.clone());

        if let Some(limit) = self.max_body_bytes {
            router = router.layer(RequestBodyLimitLayer::new(limit));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Serve until ctrl-c
    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "depot listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

pub fn depot(blobs: BlobAdapter) -> DepotApp {
    DepotApp::new(blobs)
}
