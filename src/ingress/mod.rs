use std::collections::{HashMap, HashSet};

use serde::Deserialize;

pub mod lister;

/// The parts of an ingress the bot reads. Everything else about the resource
/// is irrelevant to health checking.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoutingObject {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Names of ingresses that are never monitored.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet(HashSet<String>);

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|name| name.as_ref().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extracts the health check URLs of a single ingress.
/// Returns nothing when the annotation is missing.
pub fn health_check_urls(object: &RoutingObject, annotation_key: &str, delimiter: &str) -> Vec<String> {
    let Some(value) = object.annotations.get(annotation_key) else {
        tracing::debug!(
            "Skip. Annotation '{}' is not defined in ingress '{}'.",
            annotation_key,
            object.name
        );
        return Vec::new();
    };

    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    compact.split(delimiter).map(str::to_string).collect()
}

/// Collects the URLs of every non-excluded ingress, in listing order.
/// Duplicates across ingresses are kept.
pub fn resolve_urls(
    objects: &[RoutingObject],
    exclusions: &ExclusionSet,
    annotation_key: &str,
    delimiter: &str,
) -> Vec<String> {
    let mut urls = Vec::new();
    for object in objects {
        tracing::trace!(ingress = %object.name, "resolving health check urls");

        if exclusions.contains(&object.name) {
            tracing::debug!(
                "Skip ingress '{}' because it is in the excluded list.",
                object.name
            );
            continue;
        }

        urls.extend(health_check_urls(object, annotation_key, delimiter));
    }
    urls
}
