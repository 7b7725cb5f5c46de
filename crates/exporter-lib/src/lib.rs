//! Library for the VMware guest exporter
//!
//! This crate provides the core functionality for:
//! - Loading vmGuestLib and reading guest statistics
//! - The metric descriptor table and unit normalization
//! - A Prometheus collector over the guest-info session
//! - Health checks and observability

pub mod collector;
pub mod error;
pub mod guestlib;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;

pub use collector::{GuestCollector, RefreshFailurePolicy};
pub use error::GuestLibError;
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse};
pub use metrics::{MetricSpec, MetricTable, UnitKind};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
