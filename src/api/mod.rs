//! REST API over the live pipeline.
//!
//! - `GET /health`, `GET /members`, `GET /state`, `GET /telemetry?from=&to=`
//! - `POST /insert_tau_delta` (assign demand), `POST /activate` (mark active)
//! - `POST /activable_consumers` (allocate an eligibility message)

mod handlers;
mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::pipeline::EngineHandle;
use crate::sim::planner::GreedyPlanner;
use crate::topology::Topology;
use crate::transport::store::TelemetryStore;

/// Application state shared across all request handlers.
///
/// Reads go to the telemetry store; mutations go to the engine task
/// through its command handle, so no handler touches the world directly.
pub struct AppState {
    pub topology: Topology,
    pub engine: EngineHandle,
    pub store: Arc<TelemetryStore>,
    pub planner: GreedyPlanner,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/members", get(handlers::get_members))
        .route("/state", get(handlers::get_state))
        .route("/telemetry", get(handlers::get_telemetry))
        .route("/insert_tau_delta", post(handlers::insert_tau_delta))
        .route("/activate", post(handlers::activate))
        .route("/activable_consumers", post(handlers::activable_consumers))
        .with_state(state)
}

/// Binds to `addr` and serves the API until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error if the listener cannot bind or the server fails.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
