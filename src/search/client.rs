//! HTTP search API client
//!
//! Talks to a JSON torrent-search API laid out as `torrents/info`,
//! `torrents/search`, `torrents/descriptions` and `torrents/count`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Proxy, StatusCode};
use tracing::{debug, trace};
use url::Url;

use crate::search::types::ApiResponse;
use crate::search::{SearchApi, TorrentRecord};

/// Search API client over HTTP
pub struct SearchClient {
    client: Client,
    base_url: Url,
}

impl SearchClient {
    /// Create a new client for the API rooted at `base_url`, optionally
    /// routed through `proxy`
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration, proxy: Option<Proxy>) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("Invalid API url: {}", base_url))?;

        let mut builder = Client::builder().user_agent(user_agent).timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Build the query parameters of a search request
    ///
    /// A subcategory is only meaningful inside a category, so it is dropped
    /// when no category is given.
    fn search_params(phrase: Option<&str>, category: Option<&str>, subcategory: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            params.push(("category", category.to_string()));
            if let Some(subcategory) = subcategory.filter(|s| !s.is_empty()) {
                params.push(("subcategory", subcategory.to_string()));
            }
        }
        if let Some(phrase) = phrase {
            params.push(("phrase", phrase.to_string()));
        }
        params
    }

    async fn query(&self, endpoint: &str, params: &[(&str, String)]) -> Result<ApiResponse> {
        let url = self.base_url.join(endpoint)?;
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(url.clone())
            .query(params)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("{} answered 404, treating as no results", url);
            return Ok(ApiResponse {
                statuscode: status.as_u16(),
                torrents: Vec::new(),
                message: None,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "HTTP {} from {}: {}",
                status,
                url,
                body.chars().take(200).collect::<String>()
            ));
        }

        let body = response.bytes().await?;
        trace!("Response from {}: {} bytes", url, body.len());
        let parsed: ApiResponse = serde_json::from_slice(&body)
            .with_context(|| format!("Malformed response from {}", url))?;
        Ok(parsed)
    }

    fn message_text(response: &ApiResponse) -> Result<String> {
        match &response.message {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(anyhow::anyhow!("Response carries no message")),
        }
    }
}

#[async_trait]
impl SearchApi for SearchClient {
    async fn info(&self, hashes: &[String]) -> Result<Vec<TorrentRecord>> {
        let joined = hashes.join(",");
        Ok(self.query("torrents/info/", &[("hashes", joined)]).await?.torrents)
    }

    async fn search(
        &self,
        phrase: &str,
        category: Option<&str>,
        subcategory: Option<&str>,
    ) -> Result<Vec<TorrentRecord>> {
        let params = Self::search_params(Some(phrase), category, subcategory);
        Ok(self.query("torrents/search/", &params).await?.torrents)
    }

    async fn top(&self, category: &str, subcategory: Option<&str>) -> Result<Vec<TorrentRecord>> {
        let params = Self::search_params(None, Some(category), subcategory);
        Ok(self.query("torrents/search/", &params).await?.torrents)
    }

    async fn description(&self, hash: &str) -> Result<String> {
        let response = self.query("torrents/descriptions/", &[("hash", hash.to_string())]).await?;
        let encoded = Self::message_text(&response)?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("Description is not valid base64")?;
        Ok(String::from_utf8_lossy(&decoded).into_owned())
    }

    async fn count_total(&self) -> Result<u64> {
        let response = self.query("torrents/count/", &[]).await?;
        let text = Self::message_text(&response)?;
        text.trim_matches('"')
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Count is not a number: {}", text))
    }
}
