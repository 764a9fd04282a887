//! HTTP-backed dataset and document sources.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};

use bm_core::{DatasetSource, DocumentSource, Error, Result};

const RAW_CONTENT: &str = "application/vnd.github.v3.raw";
const AGENT: &str = concat!("bypassmap/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: reqwest::Client,
    dataset_url: String,
}

impl HttpFetcher {
    pub fn new(dataset_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(AGENT)
            .build()
            .map_err(|e| Error::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            dataset_url: dataset_url.into(),
        })
    }

    pub fn dataset_url(&self) -> &str {
        &self.dataset_url
    }

    /// Response headers of a page load, as `(name, value)` pairs.
    pub async fn response_headers(&self, url: &str) -> Result<Vec<(String, String)>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: {}", url, e)))?;

        Ok(response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect())
    }

    async fn get_text(&self, url: &str, accept: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, AGENT)
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!("{}: HTTP {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::network(format!("{}: {}", url, e)))
    }
}

#[async_trait(?Send)]
impl DatasetSource for HttpFetcher {
    async fn fetch_dataset(&self) -> Result<String> {
        self.get_text(&self.dataset_url, RAW_CONTENT).await
    }
}

#[async_trait(?Send)]
impl DocumentSource for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> Result<String> {
        self.get_text(url, "text/html,application/xhtml+xml").await
    }
}
