use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::{Client, redirect, tls::TlsInfo};
use tokio::sync::{Semaphore, mpsc};
use url::Url;

use super::cert::leaf_validity_days;
use super::prelude::*;
use super::report;
use super::resolver::DnsResolver;
use crate::error::TransportError;
use crate::retry::{RetryError, RetryPolicy};

/// How each endpoint is probed.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Hard limit for a single attempt, including connect and TLS handshake.
    pub timeout: Duration,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
    pub retry: RetryPolicy,
    /// Upper bound on probes in flight at once. `None` runs every probe of a
    /// cycle concurrently.
    pub max_concurrent: Option<usize>,
}

/// What a completed attempt observed before it is turned into a `ProbeResult`.
struct Response {
    status: u16,
    latency: Duration,
    peer_certificate: Option<Vec<u8>>,
}

/// Probes endpoints over HTTP(S). Cloning is cheap; clones share the client
/// and the concurrency limit.
#[derive(Clone)]
pub struct HealthChecker {
    client: Client,
    retry: RetryPolicy,
    max_concurrent: Option<usize>,
    limiter: Option<Arc<Semaphore>>,
}

impl HealthChecker {
    pub fn new(settings: &ProbeSettings, resolver: Option<DnsResolver>) -> Result<Self, reqwest::Error> {
        // No idle pooling and HTTP/1 only: every attempt opens its own
        // connection and performs a fresh TLS handshake.
        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(0)
            .http1_only()
            .redirect(redirect::Policy::none())
            .user_agent(settings.user_agent.clone())
            .tls_info(true)
            .danger_accept_invalid_certs(settings.accept_invalid_certs);

        if let Some(resolver) = resolver {
            builder = builder.dns_resolver(Arc::new(resolver));
        }

        Ok(Self {
            client: builder.build()?,
            retry: settings.retry,
            max_concurrent: settings.max_concurrent,
            limiter: limiter(settings.max_concurrent),
        })
    }

    /// A checker sharing this one's client but holding a separate
    /// concurrency limit of the same size.
    pub fn with_own_limit(&self) -> Self {
        Self {
            limiter: limiter(self.max_concurrent),
            ..self.clone()
        }
    }

    /// Probes `url`, retrying only when no HTTP response was received.
    pub async fn check_health(&self, url: &str) -> ProbeResult {
        let _permit = match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let outcome = self.retry.retry(|| self.attempt(url)).await;

        let result = match outcome {
            Ok(response) => {
                let cert_validity_days = if is_https(url) {
                    response
                        .peer_certificate
                        .as_deref()
                        .and_then(|der| leaf_validity_days([der], Utc::now()))
                        .unwrap_or(NOT_OBTAINED)
                } else {
                    NOT_OBTAINED
                };

                ProbeResult {
                    url: url.to_string(),
                    reachable: response.status == 200,
                    status_code: i64::from(response.status),
                    cert_validity_days,
                    response_latency: response.latency,
                }
            }
            Err(e) => {
                tracing::error!(
                    "giving up on {url} after {} attempts - {}",
                    self.retry.attempts(),
                    report(&e)
                );
                ProbeResult::unreachable(url)
            }
        };

        if result.reachable {
            tracing::debug!("{result}");
        } else {
            tracing::warn!("{result}");
        }
        result
    }

    async fn attempt(&self, url: &str) -> Result<Response, RetryError<TransportError>> {
        let start = Instant::now();
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let peer_certificate = response
                    .extensions()
                    .get::<TlsInfo>()
                    .and_then(TlsInfo::peer_certificate)
                    .map(<[u8]>::to_vec);

                if status != 200 {
                    tracing::debug!("Down. {url} {{Status:{status}}}");
                }

                Ok(Response {
                    status,
                    latency: start.elapsed(),
                    peer_certificate,
                })
            }
            Err(source) => {
                // A request that cannot even be built will fail the same way
                // on every attempt.
                let permanent = source.is_builder();
                let e = TransportError {
                    url: url.to_string(),
                    source,
                };
                tracing::debug!("{}", report(&e));
                if permanent {
                    Err(RetryError::Permanent(e))
                } else {
                    Err(RetryError::Transient(e))
                }
            }
        }
    }

    /// Probes every URL in its own task and gathers one result per URL.
    /// Results arrive in completion order, not input order.
    pub async fn check_all(&self, urls: &[String]) -> Vec<ProbeResult> {
        let (tx, mut rx) = mpsc::channel(urls.len().max(1));

        for url in urls {
            tracing::trace!("checking {url} ...");
            let checker = self.clone();
            let tx = tx.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let result = checker.check_health(&url).await;
                if tx.send(result).await.is_err() {
                    tracing::debug!("result for {url} dropped, receiver gone");
                }
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(urls.len());
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}

fn limiter(max_concurrent: Option<usize>) -> Option<Arc<Semaphore>> {
    max_concurrent.map(|permits| Arc::new(Semaphore::new(permits.max(1))))
}

fn is_https(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| parsed.scheme() == "https")
        .unwrap_or(false)
}
