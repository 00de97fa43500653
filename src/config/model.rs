use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::http_probe::prelude::ProbeSettings;
use crate::ingress::ExclusionSet;
use crate::retry::RetryPolicy;

pub const DEFAULT_APP_NAME: &str = "k8s-ingress-health-bot";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_DELIMITER: &str = ",";
pub const DEFAULT_ANNOTATION_KEY: &str = "ingress.endpoint.healthcheck.urls";
pub const DEFAULT_INGRESS_MANIFEST: &str = "ingresses.yml";
pub const DEFAULT_RETRY_INTERVAL_SECONDS: u64 = 3;

/// Bot configuration, read once at startup.
///
/// Every field is optional in the YAML file; missing fields fall back to the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Used as `User-Agent` for probes and as the metric name prefix.
    pub app_name: String,

    /// The namespace whose ingresses are monitored.
    pub namespace: String,

    /// Port of the health and metrics web server.
    pub port: u16,

    /// Maximum time a single probe attempt may take.
    pub http_client_timeout_seconds: u64,

    /// Pause between two attempts of a probe or of a listing.
    pub retry_interval_seconds: u64,

    /// Attempts before an endpoint is declared down. Must be at least 1.
    pub retry_attempts: u32,

    /// Pause between two health check cycles.
    pub metrics_populate_interval_seconds: u64,

    /// How often the gauges are cleared even when no cycle succeeds.
    pub metrics_reset_period_seconds: u64,

    /// Ingresses that are never monitored.
    pub excluded_ingress_names: Vec<String>,

    /// Ingress annotation holding the health check URLs.
    pub annotation_key: String,

    /// Separator between URLs in the annotation value.
    pub delimiter: String,

    /// YAML file listing the ingresses of the cluster.
    pub ingress_manifest: String,

    /// Probe endpoints whose certificate does not validate.
    pub accept_invalid_certs: bool,

    /// Cap on concurrent probes. Unbounded when not set.
    pub max_concurrent_probes: Option<usize>,

    /// Name servers used for probe DNS lookups instead of the system resolver.
    pub dns_hosts: Option<Vec<String>>,

    /// Optional Prometheus remote-write target for every published cycle.
    pub remote_write: Option<RemoteWriteConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteWriteConfig {
    /// Base URL, e.g. `http://localhost:9009`. `/api/v1/push` is appended.
    pub endpoint: String,

    /// Sent as `X-Scope-OrgID`.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            port: DEFAULT_PORT,
            http_client_timeout_seconds: 15,
            retry_interval_seconds: DEFAULT_RETRY_INTERVAL_SECONDS,
            retry_attempts: 3,
            metrics_populate_interval_seconds: 60,
            metrics_reset_period_seconds: 600,
            excluded_ingress_names: Vec::new(),
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            ingress_manifest: DEFAULT_INGRESS_MANIFEST.to_string(),
            accept_invalid_certs: false,
            max_concurrent_probes: None,
            dns_hosts: None,
            remote_write: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid("retry_attempts must be at least 1".into()));
        }
        if self.http_client_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "http_client_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.metrics_populate_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "metrics_populate_interval_seconds must be greater than 0".into(),
            ));
        }
        if self.delimiter.is_empty() {
            return Err(ConfigError::Invalid("delimiter must not be empty".into()));
        }
        if self.annotation_key.trim().is_empty() {
            return Err(ConfigError::Invalid("annotation_key must not be empty".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        if self.dns_hosts.as_ref().is_some_and(|hosts| hosts.is_empty()) {
            return Err(ConfigError::Invalid(
                "dns_hosts must name at least one server when set".into(),
            ));
        }
        if self.max_concurrent_probes == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent_probes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_interval_seconds),
        )
    }

    /// Pause after a cycle whose listing failed. Twice the retry interval,
    /// and never shorter than twice the default one.
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(
            self.retry_interval_seconds
                .max(DEFAULT_RETRY_INTERVAL_SECONDS),
        ) * 2
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_client_timeout_seconds)
    }

    pub fn populate_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_populate_interval_seconds)
    }

    pub fn reset_period(&self) -> Duration {
        Duration::from_secs(self.metrics_reset_period_seconds)
    }

    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(&self.excluded_ingress_names)
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout: self.http_timeout(),
            user_agent: self.app_name.clone(),
            accept_invalid_certs: self.accept_invalid_certs,
            retry: self.retry_policy(),
            max_concurrent: self.max_concurrent_probes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_deserialization() {
        let yaml = r#"
            app_name: ingress-bot
            namespace: shop
            port: 9090
            http_client_timeout_seconds: 5
            retry_interval_seconds: 1
            retry_attempts: 4
            metrics_populate_interval_seconds: 30
            metrics_reset_period_seconds: 300
            excluded_ingress_names: [internal, legacy]
            annotation_key: example.com/healthcheck
            delimiter: ";"
            ingress_manifest: /etc/bot/ingresses.yml
            accept_invalid_certs: true
            max_concurrent_probes: 16
            dns_hosts: ["1.1.1.1", "8.8.8.8"]
            remote_write:
                endpoint: http://mimir:9009
                tenant_id: shop
        "#;

        let config: Config = serde_yaml::from_str(yaml).expect("Invalid YAML");
        assert_eq!(config.app_name, "ingress-bot");
        assert_eq!(config.namespace, "shop");
        assert_eq!(config.port, 9090);
        assert_eq!(config.retry_policy(), RetryPolicy::new(4, Duration::from_secs(1)));
        assert_eq!(config.populate_interval(), Duration::from_secs(30));
        assert_eq!(config.reset_period(), Duration::from_secs(300));
        assert!(config.exclusions().contains("internal"));
        assert!(config.exclusions().contains("legacy"));
        assert_eq!(config.delimiter, ";");
        assert_eq!(config.max_concurrent_probes, Some(16));
        assert_eq!(
            config.remote_write,
            Some(RemoteWriteConfig {
                endpoint: "http://mimir:9009".to_string(),
                tenant_id: Some("shop".to_string()),
            })
        );

        let probe = config.probe_settings();
        assert_eq!(probe.timeout, Duration::from_secs(5));
        assert_eq!(probe.user_agent, "ingress-bot");
        assert!(probe.accept_invalid_certs);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_yaml::from_str("namespace: shop").expect("Invalid YAML");
        assert_eq!(
            config,
            Config {
                namespace: "shop".to_string(),
                ..Config::default()
            }
        );
        assert_eq!(config.retry_policy(), RetryPolicy::new(3, Duration::from_secs(3)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Config>("retry_atempts: 3").is_err());
    }

    #[test]
    fn test_validation() {
        let invalid = [
            Config { retry_attempts: 0, ..Config::default() },
            Config { http_client_timeout_seconds: 0, ..Config::default() },
            Config { metrics_populate_interval_seconds: 0, ..Config::default() },
            Config { delimiter: String::new(), ..Config::default() },
            Config { annotation_key: " ".to_string(), ..Config::default() },
            Config { max_concurrent_probes: Some(0), ..Config::default() },
            Config { dns_hosts: Some(Vec::new()), ..Config::default() },
        ];
        for config in invalid {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{config:?}");
        }
    }

    #[test]
    fn test_failure_backoff_never_drops_below_default() {
        let config = Config { retry_interval_seconds: 0, ..Config::default() };
        assert!(config.validate().is_ok());
        assert_eq!(config.failure_backoff(), Duration::from_secs(6));

        let config = Config { retry_interval_seconds: 1, ..Config::default() };
        assert_eq!(config.failure_backoff(), Duration::from_secs(6));

        let config = Config { retry_interval_seconds: 5, ..Config::default() };
        assert_eq!(config.failure_backoff(), Duration::from_secs(10));
    }
}
