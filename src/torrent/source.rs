//! Torrent file sources
//!
//! A source turns an info hash into the bytes of a `.torrent` file. Sources
//! are tried in configuration order: the primary first, then the mirrors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Placeholder replaced by the upper-case info hash
pub const HASH_UPPER: &str = "{HASH}";
/// Placeholder replaced by the lower-case info hash
pub const HASH_LOWER: &str = "{hash}";

/// Somewhere `.torrent` files can be fetched from
#[async_trait]
pub trait TorrentSource: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Fetch the torrent file; any error means "not available here"
    async fn fetch(&self, info_hash: &str) -> Result<Bytes>;
}

/// Fetches torrent files over HTTP from a URL template
pub struct HttpTorrentSource {
    name: String,
    template: String,
    client: Client,
}

impl HttpTorrentSource {
    /// Create a source from a URL template containing `{HASH}` or `{hash}`
    pub fn new(template: &str, client: Client) -> Result<Self> {
        if !Self::has_placeholder(template) {
            return Err(anyhow::anyhow!("Torrent source template has no hash placeholder: {}", template));
        }
        let probe_url = Self::expand(template, &"0".repeat(40));
        let parsed = Url::parse(&probe_url).with_context(|| format!("Invalid torrent source template: {}", template))?;
        let name = parsed.host_str().unwrap_or(template).to_string();

        Ok(Self {
            name,
            template: template.to_string(),
            client,
        })
    }

    /// Whether a template names the hash somewhere
    pub fn has_placeholder(template: &str) -> bool {
        template.contains(HASH_UPPER) || template.contains(HASH_LOWER)
    }

    fn expand(template: &str, info_hash: &str) -> String {
        template
            .replace(HASH_UPPER, &info_hash.to_uppercase())
            .replace(HASH_LOWER, &info_hash.to_lowercase())
    }

    /// URL this source would fetch for an info hash
    pub fn url_for(&self, info_hash: &str) -> String {
        Self::expand(&self.template, info_hash.trim())
    }
}

#[async_trait]
impl TorrentSource for HttpTorrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, info_hash: &str) -> Result<Bytes> {
        let url = self.url_for(info_hash);
        debug!("Fetching torrent file from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("HTTP {} from {}", status, url));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(anyhow::anyhow!("Empty torrent file from {}", url));
        }
        debug!("Fetched {} bytes from {}", body.len(), self.name);
        Ok(body)
    }
}
