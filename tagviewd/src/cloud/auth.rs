use std::time::{Duration, Instant};
use serde::Deserialize;
use tokio::sync::Mutex;
use crate::error::CloudError;

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the metadata server says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Supplies bearer tokens, either a fixed one from config or the instance
/// service account token from the metadata server.
pub struct TokenProvider {
    http: reqwest::Client,
    metadata_endpoint: String,
    static_token: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        http: reqwest::Client,
        metadata_endpoint: String,
        static_token: Option<String>,
    ) -> Self {
        Self {
            http,
            metadata_endpoint,
            static_token,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, CloudError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        // Held across the fetch so concurrent callers share one refresh
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!(expires_in = fresh.expires_in, "Refreshed metadata server token");

        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    async fn fetch(&self) -> Result<MetadataToken, CloudError> {
        let url = format!("{}{}", self.metadata_endpoint.trim_end_matches('/'), TOKEN_PATH);

        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("metadata server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CloudError::Auth(format!("metadata server returned {status}")));
        }

        response
            .json::<MetadataToken>()
            .await
            .map_err(|e| CloudError::Auth(format!("invalid token response: {e}")))
    }
}
