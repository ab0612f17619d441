//! REST bindings for the Google Cloud APIs the viewer reads from.
//!
//! The aggregation pipeline only sees the [`CloudRun`] and [`EndpointGroups`]
//! traits; [`run::RunClient`] and [`compute::ComputeClient`] are the
//! production implementations on top of a shared [`GoogleApi`].

pub mod auth;
pub mod compute;
pub mod run;

use std::sync::Arc;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use shared::types::{RevisionMetadata, ServiceDescriptor};
use crate::config::CloudConfig;
use crate::error::CloudError;
use self::auth::TokenProvider;

/// Largest response body excerpt kept in a status error
const ERROR_BODY_LIMIT: usize = 512;

/// Cloud Run services and revisions.
#[async_trait]
pub trait CloudRun: Send + Sync {
    /// Lazily pages through every service under `projects/{project}/locations/{location}`.
    fn list_services<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
    ) -> BoxStream<'a, Result<ServiceDescriptor, CloudError>>;

    async fn get_revision(
        &self,
        service_name: &str,
        revision_name: &str,
    ) -> Result<RevisionMetadata, CloudError>;
}

/// A regional network endpoint group and its Cloud Run URL mask, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointGroup {
    pub name: String,
    pub url_mask: Option<String>,
}

/// Regional network endpoint groups.
pub trait EndpointGroups: Send + Sync {
    fn list_network_endpoint_groups<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
    ) -> BoxStream<'a, Result<EndpointGroup, CloudError>>;
}

/// Authenticated JSON-over-HTTP access shared by the API clients.
#[derive(Clone)]
pub struct GoogleApi {
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

impl GoogleApi {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        let tokens = Arc::new(TokenProvider::new(
            http.clone(),
            config.metadata_endpoint.clone(),
            config.access_token.clone(),
        ));

        Ok(Self { http, tokens })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, CloudError> {
        let token = self.tokens.token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|source| CloudError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, ERROR_BODY_LIMIT);
            return Err(CloudError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        response.json::<T>().await.map_err(|source| CloudError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Streams the items of a `pageToken`/`nextPageToken` paginated listing.
/// Pages are fetched one at a time, only when the previous page is drained.
pub(crate) fn paginate<'a, P, T>(
    api: &'a GoogleApi,
    url: String,
    split: fn(P) -> (Vec<T>, Option<String>),
) -> BoxStream<'a, Result<T, CloudError>>
where
    P: DeserializeOwned + Send + 'a,
    T: Send + 'a,
{
    stream::try_unfold(Cursor::Start, move |cursor| {
        let url = url.clone();
        async move {
            let query = match cursor {
                Cursor::Done => return Ok::<_, CloudError>(None),
                Cursor::Start => Vec::new(),
                Cursor::Next(token) => vec![("pageToken", token)],
            };

            let page: P = match api.get_json(&url, &query).await {
                Ok(page) => page,
                Err(e) => return Err(e),
            };
            let (items, next) = split(page);
            let next = match next.filter(|t| !t.is_empty()) {
                Some(token) => Cursor::Next(token),
                None => Cursor::Done,
            };

            tracing::debug!(url = %url, items = items.len(), "Fetched page");
            Ok(Some((stream::iter(items.into_iter().map(Ok::<T, CloudError>)), next)))
        }
    })
    .try_flatten()
    .boxed()
}
