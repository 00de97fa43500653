use std::path::PathBuf;

use super::RoutingObject;
use crate::error::ListingError;

/// Read access to the current set of ingresses.
///
/// Implementations are expected to answer from a local cache; `list` is called
/// once per cycle and once per namespace health query.
pub trait RouteLister: Send + Sync {
    fn list(&self) -> Result<Vec<RoutingObject>, ListingError>;
}

/// Serves ingresses from a YAML manifest that is re-read on every call, so
/// edits to the file show up on the next cycle.
#[derive(Debug, Clone)]
pub struct ManifestLister {
    path: PathBuf,
    namespace: String,
}

impl ManifestLister {
    pub fn new(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
        }
    }
}

impl RouteLister for ManifestLister {
    fn list(&self) -> Result<Vec<RoutingObject>, ListingError> {
        let path = self.path.display().to_string();
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ListingError::Unreadable {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let objects: Vec<RoutingObject> =
            serde_yaml::from_str(&raw).map_err(|source| ListingError::Malformed { path, source })?;

        Ok(objects
            .into_iter()
            .filter(|object| object.namespace == self.namespace)
            .collect())
    }
}
