//! Conversion from scrape samples to Prometheus metric families

use crate::models::{Sample, ValueType};
use prometheus::proto::{Counter, Gauge, Metric, MetricFamily, MetricType};

/// Build a single-metric family carrying `sample`'s value
pub fn to_metric_family(sample: &Sample) -> MetricFamily {
    let mut metric = Metric::default();
    let mut family = MetricFamily::default();
    family.set_name(sample.name.clone());
    family.set_help(sample.help.clone());

    match sample.value_type {
        ValueType::Gauge => {
            let mut gauge = Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
            family.set_field_type(MetricType::GAUGE);
        }
        ValueType::Counter => {
            let mut counter = Counter::default();
            counter.set_value(sample.value);
            metric.set_counter(counter);
            family.set_field_type(MetricType::COUNTER);
        }
    }

    family.set_metric(vec![metric].into());
    family
}
