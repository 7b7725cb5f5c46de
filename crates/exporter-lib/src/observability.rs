//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Exporter self-metrics (scrape latency, build info)
//! - Structured JSON logging with tracing

use prometheus::{GaugeVec, Histogram, HistogramOpts, Opts, Registry};
use tracing::{debug, error, info, warn};

/// Histogram buckets for scrape latency (in seconds)
const SCRAPE_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Exporter self-metrics
///
/// Cheap to clone; clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    scrape_duration_seconds: Histogram,
    build_info: GaugeVec,
}

impl ExporterMetrics {
    /// Create the metrics and register them with `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let scrape_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "vmwareguest_exporter_scrape_duration_seconds",
                "Time spent reading guest statistics for one scrape",
            )
            .buckets(SCRAPE_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "vmwareguest_exporter_build_info",
                "Exporter version, value is always 1",
            ),
            &["version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            scrape_duration_seconds,
            build_info,
        })
    }

    /// Record the latency of one scrape
    pub fn observe_scrape_duration(&self, duration_secs: f64) {
        self.scrape_duration_seconds.observe(duration_secs);
    }

    pub fn set_build_info(&self, version: &str) {
        self.build_info.reset();
        self.build_info.with_label_values(&[version]).set(1.0);
    }
}

/// Structured logger for exporter lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("vmwareguest-exporter")
    }
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, telemetry_path: &str, is_guest: bool) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            exporter_version = %version,
            telemetry_path = %telemetry_path,
            is_guest = is_guest,
            "VMware guest exporter started"
        );
    }

    /// Log that no guest-info session could be opened
    pub fn log_session_unavailable(&self, error: &dyn std::fmt::Display, not_a_guest: bool) {
        if not_a_guest {
            info!(
                event = "guest_session_unavailable",
                instance = %self.instance,
                error = %error,
                "Not running on a VMware guest, only vmwareguest_isguest will be exported"
            );
        } else {
            warn!(
                event = "guest_session_unavailable",
                instance = %self.instance,
                error = %error,
                "Error creating collector, only vmwareguest_isguest will be exported"
            );
        }
    }

    /// Log a host-side session change
    pub fn log_session_changed(&self, events: u64) {
        debug!(
            event = "guest_session_changed",
            instance = %self.instance,
            events = events,
            "Guest-info session changed"
        );
    }

    /// Log a hard refresh failure
    pub fn log_refresh_failure(&self, error: &dyn std::fmt::Display, fatal: bool) {
        if fatal {
            error!(
                event = "guest_refresh_failed",
                instance = %self.instance,
                error = %error,
                fatal = true,
                "Refreshing guest statistics failed, exiting"
            );
        } else {
            warn!(
                event = "guest_refresh_failed",
                instance = %self.instance,
                error = %error,
                fatal = false,
                "Refreshing guest statistics failed, skipping scrape"
            );
        }
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "VMware guest exporter shutting down"
        );
    }
}
