//! Integration tests for the exporter API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use exporter_lib::{
    error::Result as GuestResult,
    guestlib::{GuestSession, RefreshOutcome, Stat},
    health::HealthRegistry,
    ExporterMetrics, GuestCollector, MetricTable,
};
use prometheus::Registry;
use std::sync::Arc;
use tower::ServiceExt;
use vmwareguest_exporter::api::{create_router, AppState};

/// Session reporting the same raw value for every statistic
struct ConstantSession(u64);

impl GuestSession for ConstantSession {
    fn refresh(&mut self) -> GuestResult<RefreshOutcome> {
        Ok(RefreshOutcome::Unchanged)
    }

    fn read(&self, _stat: Stat) -> GuestResult<u64> {
        Ok(self.0)
    }
}

async fn setup_test_app(
    session: Option<Box<dyn GuestSession>>,
    telemetry_path: &str,
) -> Router {
    let registry = Registry::new();
    let metrics = ExporterMetrics::register(&registry).unwrap();

    let collector = GuestCollector::new(MetricTable::vmware_guest(), session)
        .unwrap()
        .with_metrics(metrics);

    let health_registry = HealthRegistry::new();
    if collector.is_guest() {
        health_registry.record_guest_session(None).await;
    } else {
        health_registry
            .record_guest_session(Some(&"vmGuestLib not found"))
            .await;
    }
    registry.register(Box::new(collector)).unwrap();

    create_router(Arc::new(AppState::new(
        registry,
        health_registry,
        telemetry_path,
    )))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_metrics_without_session_reports_not_guest() {
    let app = setup_test_app(None, "/metrics").await;

    let (status, content_type, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.contains("text/plain"));
    assert!(body.contains("vmwareguest_isguest 0"));
    assert!(!body.contains("vmwareguest_collecterrors"));
    assert!(!body.contains("vmwareguest_events"));
    assert!(!body.contains("vmwareguest_MemBallooned_bytes"));
}

#[tokio::test]
async fn test_metrics_with_session() {
    let app = setup_test_app(Some(Box::new(ConstantSession(2))), "/metrics").await;

    let (status, _, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("vmwareguest_isguest 1"));
    assert!(body.contains("vmwareguest_MemBallooned_bytes 2097152"));
    assert!(body.contains("vmwareguest_CPUStolen_seconds 0.002"));
    assert!(body.contains("vmwareguest_HostNumCPUCores 2"));
    assert!(body.contains("# TYPE vmwareguest_CPUUsed_seconds counter"));
    assert!(body.contains("# TYPE vmwareguest_MemActive_bytes gauge"));
    assert!(body.contains("vmwareguest_events 0"));
    assert!(body.contains("vmwareguest_collecterrors 0"));
}

#[tokio::test]
async fn test_metrics_include_exporter_self_metrics() {
    let app = setup_test_app(Some(Box::new(ConstantSession(1))), "/metrics").await;

    let (_, _, body) = get(app, "/metrics").await;

    assert!(body.contains("vmwareguest_exporter_scrape_duration_seconds_bucket"));
    assert!(body.contains("vmwareguest_exporter_scrape_duration_seconds_count 1"));
}

#[tokio::test]
async fn test_custom_telemetry_path() {
    let app = setup_test_app(None, "/guest-metrics").await;

    let (status, _, body) = get(app.clone(), "/guest-metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("vmwareguest_isguest"));

    let (status, _, _) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_index_links_to_telemetry_path() {
    let app = setup_test_app(None, "/guest-metrics").await;

    let (status, content_type, body) = get(app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.contains("text/html"));
    assert!(body.contains("<h1>Vmware Guest Exporter</h1>"));
    assert!(body.contains(r#"<a href="/guest-metrics">Metrics</a>"#));
}

#[tokio::test]
async fn test_healthz_degraded_without_session() {
    let app = setup_test_app(None, "/metrics").await;

    let (status, _, body) = get(app, "/healthz").await;

    // Degraded still returns 200 (isguest 0 is served)
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["guest_session"]["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_healthy_with_session() {
    let app = setup_test_app(Some(Box::new(ConstantSession(1))), "/metrics").await;

    let (status, _, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");
}
