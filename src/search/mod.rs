//! Search module
//!
//! Torrent metadata lookups against a torrent-search web API.

pub mod client;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use client::SearchClient;
pub use types::TorrentRecord;

/// Torrent metadata source
///
/// Empty result lists are an ordinary outcome; errors are reserved for
/// transport failures and malformed responses.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Look up torrents by info hash
    async fn info(&self, hashes: &[String]) -> Result<Vec<TorrentRecord>>;

    /// Full-text search, optionally narrowed by category and subcategory
    async fn search(
        &self,
        phrase: &str,
        category: Option<&str>,
        subcategory: Option<&str>,
    ) -> Result<Vec<TorrentRecord>>;

    /// Top torrents of a category
    async fn top(&self, category: &str, subcategory: Option<&str>) -> Result<Vec<TorrentRecord>>;

    /// Decoded description text of a torrent
    async fn description(&self, hash: &str) -> Result<String>;

    /// Total number of torrents known to the API
    async fn count_total(&self) -> Result<u64>;
}
