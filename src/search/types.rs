//! Search API data types

use serde::{Deserialize, Serialize};

/// Torrent metadata as returned by the search API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    #[serde(rename = "torrent_hash")]
    pub info_hash: String,
    #[serde(rename = "torrent_title", default)]
    pub name: String,
    #[serde(rename = "seeds", default)]
    pub seeders: u32,
    #[serde(rename = "leeches", default)]
    pub leechers: u32,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "torrent_category", default)]
    pub category: String,
    #[serde(rename = "sub_category", default)]
    pub subcategory: String,
    #[serde(default)]
    pub upload_date: String,
    #[serde(default)]
    pub file_count: u32,
    #[serde(default)]
    pub magnet_uri: Option<String>,
}

impl TorrentRecord {
    /// Create a minimal record, mostly useful for tests and ad-hoc lookups
    pub fn new(info_hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            info_hash: info_hash.into(),
            name: name.into(),
            seeders: 0,
            leechers: 0,
            size: 0,
            category: String::new(),
            subcategory: String::new(),
            upload_date: String::new(),
            file_count: 0,
            magnet_uri: None,
        }
    }
}

/// Envelope shared by every search API response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub statuscode: u16,
    #[serde(default)]
    pub torrents: Vec<TorrentRecord>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}
