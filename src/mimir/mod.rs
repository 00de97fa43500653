use std::time::Duration;

use client::prompb;
use reqwest::Client;

use crate::config::model::RemoteWriteConfig;
use crate::error::RemoteWriteError;
use crate::http_probe::prelude::*;
use crate::metrics::metric_prefix;

pub mod client;

const NAMESPACE_LABEL: &str = "namespace";
const STATUS_CODE_LABEL: &str = "status_code";
const URL_LABEL: &str = "url";
const METRIC_ENDPOINT_HEALTH: &str = "endpoint_health";
const METRIC_CERT_VALIDITY_DAYS: &str = "cert_validity_days";

/// Creates the remote-write series for one cycle, mirroring the gauges of the
/// in-process sink:
///    - `<prefix>_endpoint_health{namespace, status_code, url}`: 1.0 when up, 0.0 when down.
///    - `<prefix>_cert_validity_days{namespace, url}`: days left, only for `https` URLs.
pub fn create_report_metrics(
    prefix: &str,
    namespace: &str,
    report: &AggregatedReport,
) -> Vec<prompb::TimeSeries> {
    let health_metric = format!("{prefix}_{METRIC_ENDPOINT_HEALTH}");
    let cert_metric = format!("{prefix}_{METRIC_CERT_VALIDITY_DAYS}");
    let timestamp = chrono::Utc::now().timestamp_millis();

    let mut metrics = Vec::new();
    for result in report.results() {
        let status_code = result.status_code.to_string();
        let up = if result.reachable { 1.0 } else { 0.0 };

        metrics.push(client::create_time_series(
            &health_metric,
            &[
                (NAMESPACE_LABEL, namespace),
                (STATUS_CODE_LABEL, &status_code),
                (URL_LABEL, &result.url),
            ],
            up,
            Some(timestamp),
        ));

        if result.url.starts_with("https") {
            metrics.push(client::create_time_series(
                &cert_metric,
                &[(NAMESPACE_LABEL, namespace), (URL_LABEL, &result.url)],
                result.cert_validity_days as f64,
                Some(timestamp),
            ));
        }
    }
    metrics
}

/// Pushes each published report to a remote-write endpoint. Every push is
/// bounded by the client timeout, so a stalled endpoint cannot hold up a cycle.
#[derive(Clone)]
pub struct RemoteWriter {
    client: Client,
    endpoint: String,
    tenant_id: Option<String>,
    prefix: String,
}

impl RemoteWriter {
    pub fn new(
        config: &RemoteWriteConfig,
        app_name: &str,
        timeout: Duration,
    ) -> Result<Self, RemoteWriteError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: config.endpoint.clone(),
            tenant_id: config.tenant_id.clone(),
            prefix: metric_prefix(app_name),
        })
    }

    pub async fn push(&self, namespace: &str, report: &AggregatedReport) -> Result<(), RemoteWriteError> {
        let metrics = create_report_metrics(&self.prefix, namespace, report);
        client::push_series(&self.client, &self.endpoint, self.tenant_id.as_deref(), metrics).await
    }
}
