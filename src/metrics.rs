use prometheus::{Encoder as _, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::MetricsError;
use crate::http_probe::prelude::*;

const METRIC_ENDPOINT_HEALTH: &str = "endpoint_health";
const METRIC_CERT_VALIDITY_DAYS: &str = "cert_validity_days";

const NAMESPACE_LABEL: &str = "namespace";
const STATUS_CODE_LABEL: &str = "status_code";
const URL_LABEL: &str = "url";

/// Destination for the endpoint health gauges.
///
/// Implementations synchronize internally; the scheduler publishes while
/// request handlers render.
pub trait MetricsSink: Send + Sync {
    fn set_endpoint_health(&self, namespace: &str, status_code: i64, url: &str, up: bool);

    fn set_cert_validity_days(&self, namespace: &str, url: &str, days: i64);

    /// Drops every labelled series of every gauge.
    fn reset_all(&self);

    /// Text exposition of the current gauges.
    fn render(&self) -> Result<String, MetricsError>;
}

/// Writes the gauges of a single probe result. Certificate validity is only
/// recorded for `https` URLs.
pub fn add_health_metrics(sink: &dyn MetricsSink, namespace: &str, result: &ProbeResult) {
    sink.set_endpoint_health(namespace, result.status_code, &result.url, result.reachable);

    if result.url.starts_with("https") {
        sink.set_cert_validity_days(namespace, &result.url, result.cert_validity_days);
    }
}

/// Replaces whatever the sink holds with the gauges of `report`, so endpoints
/// that disappeared since the last cycle leave nothing behind.
pub fn republish(sink: &dyn MetricsSink, namespace: &str, report: &AggregatedReport) {
    sink.reset_all();
    for result in report.results() {
        tracing::info!("{result}");
        add_health_metrics(sink, namespace, result);
    }
}

/// `MetricsSink` backed by a private Prometheus registry.
pub struct PrometheusSink {
    registry: Registry,
    endpoint_health: GaugeVec,
    cert_validity_days: GaugeVec,
}

impl PrometheusSink {
    /// Registers both gauges, prefixed with the application name.
    pub fn new(app_name: &str) -> Result<Self, MetricsError> {
        let prefix = metric_prefix(app_name);

        let endpoint_health = GaugeVec::new(
            Opts::new(
                METRIC_ENDPOINT_HEALTH,
                "Value 0 means endpoint is down, value 1 means endpoint is up.",
            )
            .namespace(prefix.clone()),
            &[NAMESPACE_LABEL, STATUS_CODE_LABEL, URL_LABEL],
        )?;
        let cert_validity_days = GaugeVec::new(
            Opts::new(METRIC_CERT_VALIDITY_DAYS, "Number of days before cert expired.")
                .namespace(prefix),
            &[NAMESPACE_LABEL, URL_LABEL],
        )?;

        tracing::debug!("Registering health related metrics...");
        let registry = Registry::new();
        registry.register(Box::new(endpoint_health.clone()))?;
        registry.register(Box::new(cert_validity_days.clone()))?;

        Ok(Self {
            registry,
            endpoint_health,
            cert_validity_days,
        })
    }
}

impl MetricsSink for PrometheusSink {
    fn set_endpoint_health(&self, namespace: &str, status_code: i64, url: &str, up: bool) {
        let status_code = status_code.to_string();
        self.endpoint_health
            .with_label_values(&[namespace, status_code.as_str(), url])
            .set(if up { 1.0 } else { 0.0 });
    }

    fn set_cert_validity_days(&self, namespace: &str, url: &str, days: i64) {
        self.cert_validity_days
            .with_label_values(&[namespace, url])
            .set(days as f64);
    }

    fn reset_all(&self) {
        tracing::debug!("Resetting health related metrics...");
        self.endpoint_health.reset();
        self.cert_validity_days.reset();
    }

    fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Metric names only allow `[a-zA-Z0-9_:]`.
pub fn metric_prefix(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
