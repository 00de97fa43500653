use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::error::ListingError;
use crate::health::NamespaceHealth;
use crate::http_probe::prelude::*;
use crate::http_probe::report;
use crate::metrics::MetricsSink;
use crate::scheduler::ReportStore;

pub const PATH_HEALTH: &str = "/health";
pub const PATH_NAMESPACE_HEALTH: &str = "/namespace-health";
pub const PATH_METRICS: &str = "/metrics";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Pause after a failed `accept`, e.g. when the process is out of file
/// descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything the request handlers read.
pub struct AppState {
    pub health: Arc<NamespaceHealth>,
    pub sink: Arc<dyn MetricsSink>,
    pub reports: ReportStore,
}

/// Accepts connections until `shutdown` turns true.
///
///   /health
///     Always 200 while the web server is up.
///   /namespace-health
///     200 if all endpoints are up, 503 if any is down, 404 if there is
///     nothing to monitor, 500 if the ingresses cannot be listed.
///   /metrics
///     Prometheus exposition of the endpoint health gauges.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    tracing::info!("Starting webserver on {} ...", listener.local_addr()?);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.wait_for(|stop| *stop) => {
                tracing::info!("Webserver stopped.");
                return Ok(());
            }
        };
        let Some((stream, peer)) = accepted_or_pause(accepted).await else {
            continue;
        };

        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle(&state, req).await) }
            });

            let builder = auto::Builder::new(TokioExecutor::new());
            if let Err(e) = builder.serve_connection(TokioIo::new(stream), service).await {
                tracing::debug!("connection from {peer} closed with error: {e}");
            }
        });
    }
}

async fn accepted_or_pause<T>(accepted: std::io::Result<T>) -> Option<T> {
    match accepted {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            tracing::warn!("failed to accept connection: {e}");
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}

/// Routes a request. Only the path and query are looked at.
pub async fn handle<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>> {
    match req.uri().path() {
        PATH_HEALTH => text(StatusCode::OK, "Healthy".to_string()),
        PATH_NAMESPACE_HEALTH => {
            let namespace = state.health.namespace();
            if wants_cached(req.uri().query()) {
                let (status, body) = cached_namespace_health(namespace, &state.reports);
                text(status, body)
            } else {
                let (status, body) = namespace_health(namespace, state.health.check().await);
                text(status, body)
            }
        }
        PATH_METRICS => match state.sink.render() {
            Ok(exposition) => {
                let mut response = text(StatusCode::OK, exposition);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_TEXT));
                response
            }
            Err(e) => {
                tracing::error!("unable to render metrics - {}", report(&e));
                text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
        _ => text(StatusCode::NOT_FOUND, "Not Found".to_string()),
    }
}

/// Status and body of a namespace health answer.
pub fn namespace_health(
    namespace: &str,
    outcome: Result<AggregatedReport, ListingError>,
) -> (StatusCode, String) {
    let cycle = match outcome {
        Ok(cycle) => cycle,
        Err(e) => {
            tracing::error!("namespace health endpoint is unhealthy - {}", report(&e));
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unhealthy\n{e}\n"),
            );
        }
    };

    if cycle.is_empty() {
        tracing::info!(
            "Namespace health is considered unhealthy. There is nothing to monitor in namespace '{namespace}'."
        );
        return (
            StatusCode::NOT_FOUND,
            format!("Unhealthy\nThere is nothing to monitor in namespace '{namespace}'.\n"),
        );
    }

    if cycle.all_up() {
        tracing::info!("Namespace health is healthy.");
        (
            StatusCode::OK,
            format!("Healthy\nAll endpoints are up.\n{}", cycle.summary()),
        )
    } else {
        tracing::error!("Namespace health is unhealthy.");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "Unhealthy\nOne or more endpoints are down.\n{}",
                cycle.summary()
            ),
        )
    }
}

fn cached_namespace_health(namespace: &str, reports: &ReportStore) -> (StatusCode, String) {
    match reports.latest() {
        Some(cycle) => namespace_health(namespace, Ok((*cycle).clone())),
        None => (
            StatusCode::NOT_FOUND,
            format!("Unhealthy\nNo completed check cycle yet in namespace '{namespace}'.\n"),
        ),
    }
}

fn wants_cached(query: Option<&str>) -> bool {
    query.is_some_and(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .any(|(key, value)| key == "cached" && (value == "true" || value == "1"))
    })
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
}
