use std::env;
use std::path::Path;

use super::model::{Config, RemoteWriteConfig};
use crate::error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Load the bot configuration from a YAML file and environment variables.
///
/// A `.env` file is honoured when present. The file named by `CONFIG_FILE`
/// must exist; without `CONFIG_FILE`, `config.yml` is used when it exists and
/// the built-in defaults otherwise. `NAMESPACE`, `PORT`, `INGRESS_MANIFEST`,
/// `DNS_HOSTS` and `MIMIR_ENDPOINT` override the file.
pub fn load_config() -> Result<Config, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let mut config = match env::var("CONFIG_FILE") {
        Ok(path) => read_config(&path)?,
        Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => read_config(DEFAULT_CONFIG_FILE)?,
        Err(_) => {
            tracing::info!("No config file found, using defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config, |name| env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

pub fn read_config(path: &str) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    parse_config(&raw, path)
}

pub fn parse_config(raw: &str, path: &str) -> Result<Config, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Applies environment overrides, looking variables up through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(namespace) = lookup("NAMESPACE") {
        config.namespace = namespace;
    }

    if let Some(port) = lookup("PORT") {
        config.port = port.trim().parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            value: port.clone(),
        })?;
    }

    if let Some(manifest) = lookup("INGRESS_MANIFEST") {
        config.ingress_manifest = manifest;
    }

    if let Some(dns_hosts) = lookup("DNS_HOSTS") {
        config.dns_hosts = Some(
            dns_hosts
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        );
    }

    if let Some(endpoint) = lookup("MIMIR_ENDPOINT") {
        let tenant_id = config.remote_write.take().and_then(|rw| rw.tenant_id);
        config.remote_write = Some(RemoteWriteConfig {
            endpoint,
            tenant_id,
        });
    }

    Ok(())
}

/// Logs the effective configuration at startup.
pub fn log_config(config: &Config) {
    tracing::info!("{} will be run with following setting: ", config.app_name);
    tracing::info!("  Namespace: {}", config.namespace);
    tracing::info!("  Port: {}", config.port);
    tracing::info!("  HttpClientTimeOut: {}s", config.http_client_timeout_seconds);
    tracing::info!("  RetryInterval: {}s", config.retry_interval_seconds);
    tracing::info!("  RetryAttempts: {}", config.retry_attempts);
    tracing::info!(
        "  MetricsPopulateInterval: {}s",
        config.metrics_populate_interval_seconds
    );
    tracing::info!("  MetricsResetPeriod: {}s", config.metrics_reset_period_seconds);
    tracing::info!("  ExcludedIngressNames: {:?}", config.excluded_ingress_names);
    tracing::info!("  Expected ingress annotation key: {}", config.annotation_key);
    tracing::info!("  Ingress manifest: {}", config.ingress_manifest);
    if let Some(dns_hosts) = &config.dns_hosts {
        tracing::info!("  DNS hosts: {:?}", dns_hosts);
    }
    if let Some(remote_write) = &config.remote_write {
        tracing::info!("  Remote write endpoint: {}", remote_write.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_overrides_from_environment() {
        let mut config = parse_config("namespace: shop\nport: 9000\n", "inline").expect("parse");

        apply_env_overrides(
            &mut config,
            env_of(&[
                ("NAMESPACE", "payments"),
                ("PORT", "8181"),
                ("INGRESS_MANIFEST", "/data/ingresses.yml"),
                ("DNS_HOSTS", "1.1.1.1, 8.8.8.8"),
                ("MIMIR_ENDPOINT", "http://mimir:9009"),
            ]),
        )
        .expect("overrides");

        assert_eq!(config.namespace, "payments");
        assert_eq!(config.port, 8181);
        assert_eq!(config.ingress_manifest, "/data/ingresses.yml");
        assert_eq!(
            config.dns_hosts,
            Some(vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()])
        );
        assert_eq!(
            config.remote_write.map(|rw| rw.endpoint),
            Some("http://mimir:9009".to_string())
        );
    }

    #[test]
    fn test_mimir_endpoint_keeps_tenant() {
        let mut config = parse_config(
            "remote_write:\n  endpoint: http://old:9009\n  tenant_id: demo\n",
            "inline",
        )
        .expect("parse");

        apply_env_overrides(&mut config, env_of(&[("MIMIR_ENDPOINT", "http://new:9009")]))
            .expect("overrides");

        assert_eq!(
            config.remote_write,
            Some(RemoteWriteConfig {
                endpoint: "http://new:9009".to_string(),
                tenant_id: Some("demo".to_string()),
            })
        );
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, env_of(&[("PORT", "eighty")]))
            .expect_err("invalid port");
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));
    }

    #[test]
    fn test_empty_file_means_defaults() {
        assert_eq!(parse_config("\n", "inline").expect("parse"), Config::default());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        assert!(matches!(
            parse_config("port: [8088", "config.yml"),
            Err(ConfigError::Parse { path, .. }) if path == "config.yml"
        ));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        assert!(matches!(
            read_config("/nonexistent/config.yml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_blank_dns_hosts_are_rejected() {
        let mut config = Config::default();

        apply_env_overrides(&mut config, env_of(&[("DNS_HOSTS", " , ")])).expect("overrides");

        assert_eq!(config.dns_hosts, Some(Vec::new()));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
