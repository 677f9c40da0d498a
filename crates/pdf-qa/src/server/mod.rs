//! HTTP API for query submission and document upload

pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Path under which the API serves the bucket when no external URL is set
pub const FILES_PREFIX: &str = "/files";

/// API server
pub struct ApiServer {
    config: RagConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: RagConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let server = &self.config.server;

        let mut router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            .merge(routes::api_routes(
                server.max_upload_size,
                server.max_files_per_upload,
            ))
            .with_state(self.state.clone());

        if self.config.storage.object_base_url.is_none() {
            router = router.nest_service(FILES_PREFIX, ServeDir::new(self.state.bucket().root()));
        }

        let router = router
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new());

        if server.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router.layer(cors)
        } else {
            router
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: tokio::net::TcpListener) -> Result<()> {
        let router = self.build_router();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Starting API server on http://{}", addr);
        }

        let state = self.state.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                state.set_ready(false);
                tracing::info!("Shutting down, no longer ready");
            })
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        tracing::info!("API server stopped");
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint
async fn readiness(state: axum::extract::State<AppState>) -> axum::http::StatusCode {
    if state.is_ready() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
}
