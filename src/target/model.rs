//! Target model
//!
//! A target is a named lookup request keyed by either a search query or an
//! info hash. The persisted definition format still uses the `"false"`
//! sentinel for "no hash"; it is converted into [`TargetKey`] on load.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HarvestError;

/// Sentinel the definition files use for "not hash based"
pub const NO_HASH_SENTINEL: &str = "false";

/// Primary resolution key of a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKey {
    /// Full-text search phrase
    Query(String),
    /// Torrent info hash
    Hash(String),
}

/// A normalized lookup request, immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub key: TargetKey,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl Target {
    /// Create a query based target
    pub fn from_query(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: TargetKey::Query(query.into()),
            category: None,
            subcategory: None,
        }
    }

    /// Create a hash based target
    pub fn from_hash(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: TargetKey::Hash(hash.into()),
            category: None,
            subcategory: None,
        }
    }

    /// Ad-hoc target for a query given on the command line
    pub fn ad_hoc_query(query: &str) -> Self {
        let query = query.trim();
        Self::from_query(query, query)
    }

    /// Ad-hoc target for a hash given on the command line
    pub fn ad_hoc_hash(hash: &str) -> Self {
        let hash = hash.trim();
        Self::from_hash(hash.to_lowercase(), hash)
    }

    /// Set the category and subcategory; empty strings count as absent
    pub fn with_category(mut self, category: Option<&str>, subcategory: Option<&str>) -> Self {
        self.category = non_empty(category);
        self.subcategory = non_empty(subcategory);
        self
    }

    /// Query string, if this is a query target
    pub fn query(&self) -> Option<&str> {
        match &self.key {
            TargetKey::Query(q) => Some(q),
            TargetKey::Hash(_) => None,
        }
    }

    /// Info hash, if this is a hash target
    pub fn info_hash(&self) -> Option<&str> {
        match &self.key {
            TargetKey::Hash(h) => Some(h),
            TargetKey::Query(_) => None,
        }
    }

    /// File stem used for this target's definition and peer record
    pub fn file_stem(&self) -> String {
        sanitize_file_stem(&self.name)
    }
}

/// Map a target name to a file stem that stays inside its directory
pub fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        stem
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            TargetKey::Query(q) => write!(f, "{} (query \"{}\")", self.name, q),
            TargetKey::Hash(h) => write!(f, "{} (hash {})", self.name, h),
        }
    }
}

/// On-disk target definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_hash")]
    pub hash: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
}

fn default_hash() -> String {
    NO_HASH_SENTINEL.to_string()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TryFrom<TargetDefinition> for Target {
    type Error = HarvestError;

    fn try_from(def: TargetDefinition) -> Result<Self, Self::Error> {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(HarvestError::config_error_with_field("Target definition has no name", "name"));
        }

        let hash = def.hash.trim();
        let query = def.query.trim();
        let has_hash = !hash.is_empty() && !hash.eq_ignore_ascii_case(NO_HASH_SENTINEL);

        let key = if has_hash {
            if !query.is_empty() {
                warn!("Target '{}' defines both a hash and a query, using the hash", name);
            }
            TargetKey::Hash(hash.to_string())
        } else if !query.is_empty() {
            TargetKey::Query(query.to_string())
        } else {
            return Err(HarvestError::config_error_with_field(
                format!("Target '{}' has neither a query nor a hash", name),
                "query",
            ));
        };

        Ok(Target {
            name: name.to_string(),
            key,
            category: None,
            subcategory: None,
        }
        .with_category(Some(&def.category), Some(&def.subcategory)))
    }
}

impl From<&Target> for TargetDefinition {
    fn from(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            query: target.query().unwrap_or_default().to_string(),
            hash: target.info_hash().unwrap_or(NO_HASH_SENTINEL).to_string(),
            category: target.category.clone().unwrap_or_default(),
            subcategory: target.subcategory.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(query: &str, hash: &str) -> TargetDefinition {
        TargetDefinition {
            name: "xubuntu 14.04".to_string(),
            query: query.to_string(),
            hash: hash.to_string(),
            category: String::new(),
            subcategory: String::new(),
        }
    }

    #[test]
    fn test_false_sentinel_means_query() {
        let target = Target::try_from(definition("xubuntu 14.04", "false")).unwrap();
        assert_eq!(target.key, TargetKey::Query("xubuntu 14.04".to_string()));
        assert!(target.category.is_none());
    }

    #[test]
    fn test_hash_wins_over_query() {
        let target = Target::try_from(definition("xubuntu", "ABC123")).unwrap();
        assert_eq!(target.info_hash(), Some("ABC123"));
        assert!(target.query().is_none());
    }

    #[test]
    fn test_malformed_definition_rejected() {
        let err = Target::try_from(definition("", "false")).unwrap_err();
        assert!(matches!(err, HarvestError::ConfigError { .. }));

        let err = Target::try_from(definition("  ", "")).unwrap_err();
        assert!(matches!(err, HarvestError::ConfigError { .. }));
    }

    #[test]
    fn test_legacy_json_parses() {
        let json = r#"{
            "name" : "xubuntu 14.04",
            "query" : "xubuntu 14.04",
            "hash" : "false",
            "category" : "Applications",
            "subcategory" : ""
        }"#;
        let def: TargetDefinition = serde_json::from_str(json).unwrap();
        let target = Target::try_from(def).unwrap();
        assert_eq!(target.category.as_deref(), Some("Applications"));
        assert!(target.subcategory.is_none());
    }

    #[test]
    fn test_definition_round_trip_keeps_sentinel() {
        let target = Target::from_query("xubuntu14.04", "xubuntu 14.04");
        let def = TargetDefinition::from(&target);
        assert_eq!(def.hash, NO_HASH_SENTINEL);
        assert_eq!(Target::try_from(def).unwrap(), target);
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(Target::from_query("xubuntu14.04", "q").file_stem(), "xubuntu14.04");
        assert_eq!(Target::from_query("xubuntu 14.04/amd64", "q").file_stem(), "xubuntu_14.04_amd64");
        assert_eq!(Target::from_query("..", "q").file_stem(), "_");
    }

    #[test]
    fn test_ad_hoc_hash_name_is_lowercase() {
        let target = Target::ad_hoc_hash(" ABCDEF ");
        assert_eq!(target.name, "abcdef");
        assert_eq!(target.info_hash(), Some("ABCDEF"));
    }
}
