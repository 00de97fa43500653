use thiserror::Error;

/// Startup configuration problems. These are fatal: the bot never starts serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in config file '{path}'")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for environment variable {name}: '{value}'")]
    Env { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid DNS host '{0}'")]
    DnsHost(String),
}

/// Failures while reading the current set of routing objects.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("unable to read ingress manifest '{path}'")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed ingress manifest '{path}'")]
    Malformed {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("there is no ingress in namespace '{0}'.")]
    Empty(String),

    #[error("ingress listing task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// A probe attempt that never produced an HTTP response.
#[derive(Debug, Error)]
#[error("request to {url} failed")]
pub struct TransportError {
    pub url: String,
    #[source]
    pub source: reqwest::Error,
}

#[derive(Debug, Error)]
#[error("prometheus registry error")]
pub struct MetricsError(#[from] pub prometheus::Error);

#[derive(Debug, Error)]
pub enum RemoteWriteError {
    #[error("failed to encode write request")]
    Encode(#[from] prost::EncodeError),

    #[error("failed to compress write request")]
    Compress(#[from] snap::Error),

    #[error("invalid tenant id header")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("remote write request failed")]
    Request(#[from] reqwest::Error),

    #[error("remote write rejected: {status} - {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}
