use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::protocol::{ANNOTATION_BASE_URL, ANNOTATION_SERVERLESS_NEG};

/// A deployed Cloud Run service as returned by the services listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Full resource name, e.g. "projects/p/locations/us-central1/services/svc1"
    pub name: String,

    #[serde(default)]
    pub annotations: HashMap<String, String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Traffic assignments in declaration order
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
}

impl ServiceDescriptor {
    /// Non-empty annotation value, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn base_url(&self) -> Option<&str> {
        self.annotation(ANNOTATION_BASE_URL)
    }

    pub fn serverless_neg(&self) -> Option<&str> {
        self.annotation(ANNOTATION_SERVERLESS_NEG)
    }

    /// Last path segment of the resource name
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Label value for `key`, empty when the label is absent
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

/// One entry of a service's traffic split.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficTarget {
    #[serde(default)]
    pub revision: String,

    #[serde(default)]
    pub tag: String,
}

/// A revision bound to a non-empty traffic tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficTagBinding {
    pub revision_name: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionMetadata {
    pub revision_name: String,
    pub created_at: DateTime<Utc>,
}

/// A display row for one resolved tagged revision.
/// `url` and `service` carry ready-to-render anchor markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub date: String,
    pub url: String,
    #[serde(rename = "identifyinglabel")]
    pub identifying_label: String,
    pub service: String,
    #[serde(rename = "baseurl")]
    pub base_url: String,
    #[serde(rename = "revisiontag")]
    pub revision_tag: String,
}

/// Body of the data endpoint. `data` is null when aggregation failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Option<Vec<Row>>,
}
