//! HTTP API: landing page, health check and Prometheus scrape endpoint

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use exporter_lib::health::{HealthRegistry, HealthResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub health_registry: HealthRegistry,
    pub telemetry_path: String,
}

impl AppState {
    pub fn new(
        registry: Registry,
        health_registry: HealthRegistry,
        telemetry_path: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            health_registry,
            telemetry_path: telemetry_path.into(),
        }
    }
}

/// Static landing page linking to the telemetry path
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>Vmware Guest Exporter</title></head>
<body>
<h1>Vmware Guest Exporter</h1>
<p><a href="{path}">Metrics</a></p>
</body>
</html>"#,
        path = state.telemetry_path
    ))
}

/// Health check response
///
/// Always 200 while the server is up: a degraded exporter still serves
/// `vmwareguest_isguest 0`.
async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.health_registry.health().await)
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    // Collecting calls into vmGuestLib, which blocks
    let registry = state.registry.clone();
    let metric_families = match tokio::task::spawn_blocking(move || registry.gather()).await {
        Ok(families) => families,
        Err(e) => {
            error!(error = %e, "Metric gathering task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route(&telemetry_path, get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
