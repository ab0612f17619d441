use thiserror::Error;
use crate::resolve::neg::NegUrlMaskTable;

/// Failure talking to a Google Cloud REST API.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to obtain access token: {0}")]
    Auth(String),
}

/// The service listing could not be completed. Fatal to an aggregation run.
#[derive(Debug, Error)]
#[error("failed to list services in {parent}: {source}")]
pub struct ListingError {
    pub parent: String,
    #[source]
    pub source: CloudError,
}

/// The NEG listing stopped part way. `partial` holds what was read before the failure.
#[derive(Debug, Error)]
#[error("failed to list serverless NEG url masks: {source}")]
pub struct MaskTableError {
    pub partial: NegUrlMaskTable,
    #[source]
    pub source: CloudError,
}

/// A single tagged revision could not be turned into a row.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to get revision {revision}: {source}")]
    Revision {
        revision: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to get revision tag url for service {service}, {revision}")]
    NoAddressing { service: String, revision: String },

    #[error("malformed service name {0}")]
    MalformedServiceName(String),
}
