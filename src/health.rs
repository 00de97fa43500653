use std::sync::Arc;

use crate::config::model::Config;
use crate::error::ListingError;
use crate::http_probe::prelude::*;
use crate::http_probe::report;
use crate::ingress::{ExclusionSet, lister::RouteLister, resolve_urls};
use crate::retry::{RetryError, RetryPolicy};

/// The list → resolve → probe pipeline of one namespace.
///
/// The scheduler and the namespace health endpoint each hold one. It has no
/// mutable state, so a pipeline can run several times concurrently.
pub struct NamespaceHealth {
    namespace: String,
    lister: Arc<dyn RouteLister>,
    exclusions: ExclusionSet,
    annotation_key: String,
    delimiter: String,
    retry: RetryPolicy,
    checker: HealthChecker,
}

impl NamespaceHealth {
    pub fn new(config: &Config, lister: Arc<dyn RouteLister>, checker: HealthChecker) -> Self {
        Self {
            namespace: config.namespace.clone(),
            lister,
            exclusions: config.exclusions(),
            annotation_key: config.annotation_key.clone(),
            delimiter: config.delimiter.clone(),
            retry: config.retry_policy(),
            checker,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Lists the ingresses, retrying on failure or when there are none, and
    /// resolves their health check URLs. The lister runs on the blocking pool.
    pub async fn list_urls(&self) -> Result<Vec<String>, ListingError> {
        let objects = self
            .retry
            .retry(|| async move {
                let lister = self.lister.clone();
                let listed = match tokio::task::spawn_blocking(move || lister.list()).await {
                    Ok(listed) => listed,
                    Err(e) => return Err(RetryError::Permanent(ListingError::from(e))),
                };
                match listed {
                    Ok(objects) if objects.is_empty() => Err(RetryError::Transient(
                        ListingError::Empty(self.namespace.clone()),
                    )),
                    Ok(objects) => Ok(objects),
                    Err(e @ ListingError::Malformed { .. }) => Err(RetryError::Permanent(e)),
                    Err(e) => {
                        tracing::warn!("unable to list ingresses - {}", report(&e));
                        Err(RetryError::Transient(e))
                    }
                }
            })
            .await?;

        Ok(resolve_urls(
            &objects,
            &self.exclusions,
            &self.annotation_key,
            &self.delimiter,
        ))
    }

    pub async fn probe(&self, urls: &[String]) -> AggregatedReport {
        AggregatedReport::new(self.checker.check_all(urls).await)
    }

    /// Runs the whole pipeline once.
    pub async fn check(&self) -> Result<AggregatedReport, ListingError> {
        let urls = self.list_urls().await?;
        Ok(self.probe(&urls).await)
    }
}
