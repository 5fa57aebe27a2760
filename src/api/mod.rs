//! Ingestion & Query API: the HTTP surface agents push to and dashboards
//! and the alert engine read from.
//!
//! ## Endpoints
//!
//! - `POST /ingest` — agent metric push
//! - `GET /health` — liveness/degraded status
//! - `GET /api/metrics/query` — latest value of a named metric
//! - `GET /api/metrics/range` — minute-bucketed average over a window
//! - `GET /api/metrics/services` — distinct service classes
//! - `GET /api/metrics/targets` — distinct targets for a service
//! - `GET /api/alert-rules`, `POST /api/alert-rules`,
//!   `GET/PUT/DELETE /api/alert-rules/{id}` — rule CRUD
//! - `GET /api/alerts/active` — currently-firing alerts

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(routes::ingest::ingest))
        .route("/health", get(routes::health::health))
        .route("/api/metrics/query", get(routes::metrics::query_latest))
        .route("/api/metrics/range", get(routes::metrics::query_range))
        .route("/api/metrics/services", get(routes::metrics::list_services))
        .route("/api/metrics/targets", get(routes::metrics::list_targets))
        .route(
            "/api/alert-rules",
            get(routes::alert_rules::list_rules).post(routes::alert_rules::create_rule),
        )
        .route(
            "/api/alert-rules/:id",
            get(routes::alert_rules::get_rule)
                .put(routes::alert_rules::update_rule)
                .delete(routes::alert_rules::delete_rule),
        )
        .route("/api/alerts/active", get(routes::alert_rules::active_alerts))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind and serve the API. Runs until the returned future is dropped or
/// the process is signaled; callers drive shutdown from their own
/// ctrl_c/SIGTERM select loop.
pub async fn serve(config: ApiConfig, state: ApiState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
