//! Persisted peer record

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::peer::PeerSet;

/// Every peer ever discovered for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Target name
    pub target: String,
    /// First info hash that contributed peers, lower-case hex
    #[serde(default)]
    pub info_hash: Option<String>,
    /// Every contributing info hash, lower-case hex
    #[serde(default)]
    pub torrents: BTreeSet<String>,
    /// Known peers, sorted
    #[serde(default)]
    pub peers: PeerSet,
    pub last_updated: DateTime<Utc>,
}

impl PeerRecord {
    /// Create an empty record
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            info_hash: None,
            torrents: BTreeSet::new(),
            peers: PeerSet::new(),
            last_updated: Utc::now(),
        }
    }

    /// Union `peers` and `info_hashes` into the record.
    ///
    /// Returns how many peers were not already known. Nothing is ever removed.
    pub fn merge(&mut self, info_hashes: &[String], peers: &PeerSet) -> usize {
        let before = self.peers.len();
        self.peers.extend(peers.iter().copied());

        for hash in info_hashes {
            let hash = hash.trim().to_lowercase();
            if hash.is_empty() {
                continue;
            }
            if self.info_hash.is_none() {
                self.info_hash = Some(hash.clone());
            }
            self.torrents.insert(hash);
        }

        self.last_updated = Utc::now();
        self.peers.len() - before
    }

    /// Serialize to pretty JSON
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
