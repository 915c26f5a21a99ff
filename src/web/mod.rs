//! Web layer module
//!
//! Management API over the service registry. Handlers resolve a service by
//! id or name and answer with owned snapshots of its state.

use anyhow::Result;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    collector::{Scheduler, ServiceRegistry},
    config::Config,
    sources::WorkerTable,
};

pub mod api;
pub mod middleware;
pub mod responses;

pub use responses::ApiResponse;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub registry: ServiceRegistry,
    pub workers: WorkerTable,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(scheduler: Scheduler, workers: WorkerTable, config: Arc<Config>) -> Self {
        Self {
            registry: scheduler.registry().clone(),
            scheduler,
            workers,
            config,
        }
    }
}

/// Build the full router: `/health` plus the `/api/v1` management routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/services",
            get(api::list_services).post(api::start_service),
        )
        .route("/services/:id", get(api::get_service))
        .route("/services/:id/runtime", get(api::service_runtime))
        .route("/services/:id/errors", get(api::service_errors))
        .route("/services/:id/store", get(api::service_store))
        .route("/services/:id/cancel", post(api::cancel_service))
        .route("/workers", get(api::list_workers))
        .route_layer(from_fn_with_state(state, middleware::require_api_key))
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;

        Ok(Self {
            app: router(state),
            addr,
        })
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Web server listening on http://{}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
