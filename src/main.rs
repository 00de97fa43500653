use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

pub mod config;
use config::app_config::{load_config, log_config};
pub mod error;
pub mod health;
use health::NamespaceHealth;
pub mod http_probe;
use http_probe::{prelude::*, report, resolver::setup_resolver};
pub mod ingress;
use ingress::lister::ManifestLister;
pub mod metrics;
use metrics::{MetricsSink, PrometheusSink};
pub mod mimir;
use mimir::RemoteWriter;
pub mod retry;
pub mod scheduler;
use scheduler::{ReportStore, Scheduler};
pub mod web;
use web::AppState;

/// How long a cycle in progress may keep the process alive after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", report(&*e));
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    log_config(&config);

    let resolver = config.dns_hosts.as_deref().map(setup_resolver).transpose()?;
    let checker = HealthChecker::new(&config.probe_settings(), resolver)?;

    tracing::info!(
        "Creating new Bot to watch ingresses in namespace '{}'...",
        config.namespace
    );
    let lister = Arc::new(ManifestLister::new(
        &config.ingress_manifest,
        &config.namespace,
    ));
    // On-demand queries get a probe limit of their own.
    let query_health = Arc::new(NamespaceHealth::new(
        &config,
        lister.clone(),
        checker.with_own_limit(),
    ));
    let health = Arc::new(NamespaceHealth::new(&config, lister, checker));
    let sink: Arc<dyn MetricsSink> = Arc::new(PrometheusSink::new(&config.app_name)?);
    let reports = ReportStore::default();
    let remote_writer = config
        .remote_write
        .as_ref()
        .map(|remote_write| {
            RemoteWriter::new(remote_write, &config.app_name, config.http_timeout())
        })
        .transpose()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let state = Arc::new(AppState {
        health: query_health,
        sink: sink.clone(),
        reports: reports.clone(),
    });
    let server = tokio::spawn(web::serve(listener, state, shutdown_rx.clone()));

    let scheduler = Scheduler::new(&config, health, sink, reports, remote_writer);
    let controller = tokio::spawn(scheduler.run(shutdown_rx));

    shutdown_signal().await;
    tracing::info!("Shutdown requested, stopping...");
    shutdown_tx.send_replace(true);

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("webserver failed: {e}"),
        Err(e) => tracing::error!("webserver task failed: {e}"),
    }

    // Probes are never cancelled; a cycle still running after the grace
    // period is abandoned.
    if tokio::time::timeout(SHUTDOWN_GRACE, controller).await.is_err() {
        tracing::warn!("Health check cycle still running, abandoning it.");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
