//! Guest statistics collector
//!
//! [`GuestCollector`] turns one scrape into a set of [`Sample`]s by refreshing
//! the guest-info session and reading every entry of the [`MetricTable`].
//! It implements [`prometheus::core::Collector`] so it can be registered
//! with a [`prometheus::Registry`] and served by any exposition handler.

mod family;


pub use family::to_metric_family;

use crate::error::GuestLibError;
use crate::guestlib::{open_default_session, GuestSession, RefreshOutcome};
use crate::metrics::{MetricTable, NAMESPACE};
use crate::models::Sample;
use crate::observability::{ExporterMetrics, StructuredLogger};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

const ISGUEST_HELP: &str = "1 if running on a vmware guest with tools installed, 0 otherwise";
const EVENTS_HELP: &str = "events e.g. snapshot, vmotion, etc";
const COLLECTERRORS_HELP: &str = "errors harvesting metrics";

fn isguest_name() -> String {
    format!("{}isguest", NAMESPACE)
}

fn events_name() -> String {
    format!("{}events", NAMESPACE)
}

fn collecterrors_name() -> String {
    format!("{}collecterrors", NAMESPACE)
}

/// What to do when refreshing an established session fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshFailurePolicy {
    /// Log and terminate the process with status 1
    #[default]
    Exit,
    /// Log, count a collection error and skip the table for this scrape
    #[serde(rename = "skip", alias = "skip-scrape")]
    SkipScrape,
}

/// Mutable scrape state, guarded as a whole
struct CollectorState {
    session: Option<Box<dyn GuestSession>>,
    errors: u64,
    events: u64,
}

/// Collector exporting VMware guest statistics
///
/// The entire scrape body runs under one lock, so concurrent scrapes are
/// serialized rather than interleaving refreshes and reads.
pub struct GuestCollector {
    table: MetricTable,
    is_guest: bool,
    descs: Vec<Desc>,
    state: Mutex<CollectorState>,
    policy: RefreshFailurePolicy,
    logger: StructuredLogger,
    metrics: Option<ExporterMetrics>,
}

impl GuestCollector {
    /// Build a collector over an already-opened session, or none.
    pub fn new(
        table: MetricTable,
        session: Option<Box<dyn GuestSession>>,
    ) -> prometheus::Result<Self> {
        let is_guest = session.is_some();

        let mut descs = vec![Self::make_desc(isguest_name(), ISGUEST_HELP)?];
        if is_guest {
            for spec in table.iter() {
                descs.push(Self::make_desc(spec.fq_name(), spec.help)?);
            }
            descs.push(Self::make_desc(events_name(), EVENTS_HELP)?);
            descs.push(Self::make_desc(collecterrors_name(), COLLECTERRORS_HELP)?);
        }

        Ok(Self {
            table,
            is_guest,
            descs,
            state: Mutex::new(CollectorState {
                session,
                errors: 0,
                events: 0,
            }),
            policy: RefreshFailurePolicy::default(),
            logger: StructuredLogger::default(),
            metrics: None,
        })
    }

    /// Open a native guest-info session and build a collector around it.
    ///
    /// If the session cannot be opened the collector is still returned,
    /// exporting only `vmwareguest_isguest 0`, alongside the error.
    pub fn open(
        table: MetricTable,
        library_path: Option<&Path>,
    ) -> prometheus::Result<(Self, Option<GuestLibError>)> {
        match open_default_session(library_path) {
            Ok(session) => Ok((Self::new(table, Some(session))?, None)),
            Err(e) => Ok((Self::new(table, None)?, Some(e))),
        }
    }

    pub fn with_policy(mut self, policy: RefreshFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Record scrape latency into exporter self-metrics
    pub fn with_metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn make_desc(name: String, help: &str) -> prometheus::Result<Desc> {
        Desc::new(name, help.to_string(), vec![], HashMap::new())
    }

    pub fn is_guest(&self) -> bool {
        self.is_guest
    }

    pub fn policy(&self) -> RefreshFailurePolicy {
        self.policy
    }

    /// Cumulative count of failed reads
    pub fn errors(&self) -> u64 {
        self.lock().errors
    }

    /// Cumulative count of host-side session changes
    pub fn events(&self) -> u64 {
        self.lock().events
    }

    /// Names of every metric this collector can emit
    pub fn describe(&self) -> Vec<String> {
        self.descs.iter().map(|d| d.fq_name.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one scrape and return its samples in emission order.
    pub fn scrape(&self) -> Vec<Sample> {
        let mut state = self.lock();
        let start = Instant::now();

        let samples = self.scrape_locked(&mut state);

        if let Some(metrics) = &self.metrics {
            metrics.observe_scrape_duration(start.elapsed().as_secs_f64());
        }

        samples
    }

    fn scrape_locked(&self, state: &mut CollectorState) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(self.table.len() + 3);
        samples.push(Sample::gauge(
            isguest_name(),
            ISGUEST_HELP,
            if state.session.is_some() { 1.0 } else { 0.0 },
        ));

        let CollectorState {
            session,
            errors,
            events,
        } = state;
        let Some(session) = session.as_mut() else {
            return samples;
        };

        let refreshed = match session.refresh() {
            Ok(RefreshOutcome::SessionChanged) => {
                *events += 1;
                self.logger.log_session_changed(*events);
                true
            }
            Ok(RefreshOutcome::Unchanged) => true,
            Err(e) => match self.policy {
                RefreshFailurePolicy::Exit => {
                    self.logger.log_refresh_failure(&e, true);
                    std::process::exit(1);
                }
                RefreshFailurePolicy::SkipScrape => {
                    self.logger.log_refresh_failure(&e, false);
                    *errors += 1;
                    false
                }
            },
        };

        if refreshed {
            for spec in self.table.iter() {
                match spec.measure(&**session) {
                    Ok(value) => samples.push(Sample {
                        name: spec.fq_name(),
                        help: spec.help.to_string(),
                        value,
                        value_type: spec.value_type(),
                    }),
                    // Read failures are counted, not logged
                    Err(_) => *errors += 1,
                }
            }
        }

        samples.push(Sample::counter(events_name(), EVENTS_HELP, *events as f64));
        samples.push(Sample::counter(
            collecterrors_name(),
            COLLECTERRORS_HELP,
            *errors as f64,
        ));

        samples
    }
}

impl Collector for GuestCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.scrape().iter().map(to_metric_family).collect()
    }
}
