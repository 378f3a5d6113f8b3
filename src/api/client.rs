use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::Upstream;
use crate::config::Settings;
use crate::error::FetchError;

/// HTTP transport for the upstream API. One GET per call; no retries.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(&settings.user_agent).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| FetchError::Network(format!("invalid request URL: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

impl Upstream for ApiClient {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let url = self.url(path, query)?;
        debug!(%url, "upstream request");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(path, status = status.as_u16(), "upstream returned an error status");
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|err| {
            if err.is_decode() {
                FetchError::InvalidJson(err.to_string())
            } else {
                FetchError::Network(err.to_string())
            }
        })
    }
}
