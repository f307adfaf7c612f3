//! Torrent information structures
//!
//! The subset of metainfo needed to reach a swarm.

use sha1::{Digest, Sha1};

/// High-level torrent information
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Tracker URLs: `announce` first, then every `announce-list` entry
    pub trackers: Vec<String>,
    /// SHA1 hash of info dictionary
    pub info_hash: [u8; 20],
    /// Torrent name
    pub name: String,
    /// Sum of all file lengths
    pub total_length: u64,
}

impl TorrentInfo {
    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Check the info hash against a hex string, ignoring case
    pub fn matches_hash(&self, hex_hash: &str) -> bool {
        self.info_hash_hex().eq_ignore_ascii_case(hex_hash.trim())
    }

    /// Generate info hash from info dictionary bytes
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }
}
