use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::config::model::Config;
use crate::error::ListingError;
use crate::health::NamespaceHealth;
use crate::http_probe::prelude::*;
use crate::http_probe::report;
use crate::metrics::{MetricsSink, republish};
use crate::mimir::RemoteWriter;

/// Latest published report. Each publish swaps the whole report; readers
/// never observe a partially written cycle.
#[derive(Clone)]
pub struct ReportStore {
    tx: Arc<watch::Sender<Option<Arc<AggregatedReport>>>>,
}

impl Default for ReportStore {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl ReportStore {
    pub fn replace(&self, report: Arc<AggregatedReport>) {
        self.tx.send_replace(Some(report));
    }

    pub fn latest(&self) -> Option<Arc<AggregatedReport>> {
        self.tx.borrow().clone()
    }
}

/// Drives the health check cycles and keeps the published state fresh.
pub struct Scheduler {
    health: Arc<NamespaceHealth>,
    sink: Arc<dyn MetricsSink>,
    reports: ReportStore,
    remote_writer: Option<RemoteWriter>,
    populate_interval: Duration,
    reset_period: Duration,
    failure_backoff: Duration,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        health: Arc<NamespaceHealth>,
        sink: Arc<dyn MetricsSink>,
        reports: ReportStore,
        remote_writer: Option<RemoteWriter>,
    ) -> Self {
        Self {
            health,
            sink,
            reports,
            remote_writer,
            populate_interval: config.populate_interval(),
            reset_period: config.reset_period(),
            failure_backoff: config.failure_backoff(),
        }
    }

    /// Runs cycles until `shutdown` turns true. Shutdown is only observed
    /// while sleeping between cycles.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Controller is ready.");
        let mut last_reset = Instant::now();

        loop {
            self.reset_if_due(&mut last_reset);

            tracing::info!("Checking ingress endpoints...");
            let pause = match self.run_cycle().await {
                Ok(()) => {
                    tracing::info!("Check completed!");
                    self.populate_interval
                }
                Err(e) => {
                    tracing::error!("unable to get ingresses health - {}", report(&e));
                    tracing::info!("Sleep for {:?} and try again...", self.failure_backoff);
                    self.failure_backoff
                }
            };

            if sleep_or_shutdown(pause, &mut shutdown).await {
                tracing::info!("Controller stopped.");
                return;
            }
        }
    }

    /// One list → probe → publish pass.
    pub async fn run_cycle(&self) -> Result<(), ListingError> {
        let urls = self.health.list_urls().await?;
        tracing::debug!("probing {} endpoints", urls.len());

        let cycle = self.health.probe(&urls).await;
        self.publish(cycle).await;
        Ok(())
    }

    async fn publish(&self, cycle: AggregatedReport) {
        let cycle = Arc::new(cycle);
        self.reports.replace(cycle.clone());
        republish(self.sink.as_ref(), self.health.namespace(), &cycle);

        if let Some(writer) = &self.remote_writer {
            if let Err(e) = writer.push(self.health.namespace(), &cycle).await {
                tracing::warn!("Failed to push metrics: {}", report(&e));
            }
        }
    }

    /// Clears the sink when the reset period has passed, whatever the outcome
    /// of recent cycles, so failing cycles cannot leave gauges frozen.
    fn reset_if_due(&self, last_reset: &mut Instant) -> bool {
        if last_reset.elapsed() <= self.reset_period {
            return false;
        }
        tracing::info!("Clear the Prometheus health metrics cache.");
        self.sink.reset_all();
        *last_reset = Instant::now();
        true
    }
}

/// Returns true when shutdown was requested before `pause` elapsed.
async fn sleep_or_shutdown(pause: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => false,
        _ = shutdown.wait_for(|stop| *stop) => true,
    }
}
