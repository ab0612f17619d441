use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Deserialize;
use shared::types::{RevisionMetadata, ServiceDescriptor};
use crate::error::CloudError;
use super::{paginate, CloudRun, GoogleApi};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListServicesResponse {
    #[serde(default)]
    services: Vec<ServiceDescriptor>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionResource {
    create_time: DateTime<Utc>,
}

/// Cloud Run Admin API v2 client.
pub struct RunClient {
    api: GoogleApi,
    endpoint: String,
}

impl RunClient {
    pub fn new(api: GoogleApi, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { api, endpoint }
    }
}

#[async_trait]
impl CloudRun for RunClient {
    fn list_services<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
    ) -> BoxStream<'a, Result<ServiceDescriptor, CloudError>> {
        let url = format!(
            "{}/v2/projects/{}/locations/{}/services",
            self.endpoint, project, location
        );
        paginate(&self.api, url, |page: ListServicesResponse| {
            (page.services, page.next_page_token)
        })
    }

    async fn get_revision(
        &self,
        service_name: &str,
        revision_name: &str,
    ) -> Result<RevisionMetadata, CloudError> {
        let url = format!("{}/v2/{}/revisions/{}", self.endpoint, service_name, revision_name);
        let revision: RevisionResource = self.api.get_json(&url, &[]).await?;

        Ok(RevisionMetadata {
            revision_name: revision_name.to_string(),
            created_at: revision.create_time,
        })
    }
}
