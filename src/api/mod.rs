//! HTTP surface: video files, frame extraction and uploads.

pub mod error;
pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;

use crate::config::ApiConfig;
use crate::error::Result;
use crate::framer::Framer;
use crate::storage::Storage;

/// State shared by every handler
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ApiConfig>,
    pub framer: Arc<Framer>,
    pub storage: Arc<Storage>,
    /// Service lifetime token; per-request tokens are derived from it
    pub shutdown: CancellationToken,
}

pub struct Api {
    config: ApiConfig,
    framer: Arc<Framer>,
    storage: Arc<Storage>,
}

impl Api {
    pub fn new(config: ApiConfig, framer: Arc<Framer>, storage: Arc<Storage>) -> Self {
        Self {
            config,
            framer,
            storage,
        }
    }

    pub fn router(&self, shutdown: CancellationToken) -> Router {
        let state = ApiState {
            config: Arc::new(self.config.clone()),
            framer: Arc::clone(&self.framer),
            storage: Arc::clone(&self.storage),
            shutdown,
        };

        // Videos are streamed to disk, so no cap unless one is configured
        let upload_limit = match self.config.max_upload_bytes {
            Some(limit) => DefaultBodyLimit::max(limit),
            None => DefaultBodyLimit::disable(),
        };

        Router::new()
            .route("/video/:filename", get(handlers::get_video))
            .route("/video/:filename/frame/:index", get(handlers::get_frame))
            .route("/video/:filename/frame/:index/thumbnail", get(handlers::get_thumbnail))
            .route("/videos", get(handlers::list_videos))
            .route("/upload", post(handlers::upload_video).layer(upload_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve until `shutdown` is cancelled, then let in-flight requests finish
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen_port));
        let listener = TcpListener::bind(addr).await?;
        info!("Video API listening on {}", addr);

        let app = self.router(shutdown.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Video API stopped");
        Ok(())
    }
}
