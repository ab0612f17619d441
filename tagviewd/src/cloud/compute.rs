use futures::stream::BoxStream;
use serde::Deserialize;
use crate::error::CloudError;
use super::{paginate, EndpointGroup, EndpointGroups, GoogleApi};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkEndpointGroupList {
    #[serde(default)]
    items: Vec<NetworkEndpointGroup>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkEndpointGroup {
    name: String,
    cloud_run: Option<CloudRunTarget>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudRunTarget {
    url_mask: Option<String>,
}

impl From<NetworkEndpointGroup> for EndpointGroup {
    fn from(neg: NetworkEndpointGroup) -> Self {
        Self {
            name: neg.name,
            url_mask: neg.cloud_run.and_then(|c| c.url_mask),
        }
    }
}

/// Compute Engine API v1 client, limited to regional network endpoint groups.
pub struct ComputeClient {
    api: GoogleApi,
    endpoint: String,
}

impl ComputeClient {
    pub fn new(api: GoogleApi, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { api, endpoint }
    }
}

impl EndpointGroups for ComputeClient {
    fn list_network_endpoint_groups<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
    ) -> BoxStream<'a, Result<EndpointGroup, CloudError>> {
        let url = format!(
            "{}/compute/v1/projects/{}/regions/{}/networkEndpointGroups",
            self.endpoint, project, region
        );
        paginate(&self.api, url, |page: NetworkEndpointGroupList| {
            (
                page.items.into_iter().map(EndpointGroup::from).collect(),
                page.next_page_token,
            )
        })
    }
}
