//! Resolution strategy
//!
//! Turns a [`Target`] into the list of torrents it refers to: hash targets go
//! through the info lookup, query targets through search. The API's ranking
//! is kept as is.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::HarvestError;
use crate::search::{SearchApi, TorrentRecord};
use crate::target::{Target, TargetKey};

/// Resolves targets against a search API
pub struct Resolver {
    api: Arc<dyn SearchApi>,
}

impl Resolver {
    /// Create a new resolver
    pub fn new(api: Arc<dyn SearchApi>) -> Self {
        Self { api }
    }

    /// Resolve a target into torrents
    pub async fn resolve(&self, target: &Target) -> Result<Vec<TorrentRecord>, HarvestError> {
        let records = match &target.key {
            TargetKey::Hash(hash) => {
                debug!("Resolving {} by info hash", target.name);
                self.api
                    .info(std::slice::from_ref(hash))
                    .await
                    .map_err(|e| {
                        warn!("Info lookup for {} failed: {:#}", target.name, e);
                        HarvestError::resolution_error_full("Info lookup failed", &target.name, format!("{:#}", e))
                    })?
            }
            TargetKey::Query(query) => {
                debug!(
                    "Resolving {} by search (category: {:?}, subcategory: {:?})",
                    target.name, target.category, target.subcategory
                );
                self.api
                    .search(query, target.category.as_deref(), target.subcategory.as_deref())
                    .await
                    .map_err(|e| {
                        warn!("Search for {} failed: {:#}", target.name, e);
                        HarvestError::resolution_error_full("Search failed", &target.name, format!("{:#}", e))
                    })?
            }
        };

        if records.is_empty() {
            return Err(HarvestError::resolution_not_found("No torrents matched", &target.name));
        }

        info!("Resolved {} to {} torrent(s)", target.name, records.len());
        Ok(records)
    }
}
