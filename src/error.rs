//! Error types for the peer harvester
//!
//! This module defines the error taxonomy shared by the resolution,
//! discovery and persistence stages and by the configuration layer.

use std::fmt;

/// Comprehensive error type for harvester operations
#[derive(Debug, Clone)]
pub enum HarvestError {
    /// Target lookup against the search API failed or returned nothing
    ResolutionError {
        message: String,
        target: String,
        source: Option<String>,
        not_found: bool,
    },

    /// No peer discovery method produced a peer
    DiscoveryError {
        message: String,
        info_hash: Option<String>,
        source: Option<String>,
    },

    /// Reading or writing a peer record failed
    PersistenceError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Configuration or target definition errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Network errors
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Bencode, JSON or metainfo parsing errors
    ParseError {
        message: String,
        source: Option<String>,
    },
}

impl HarvestError {
    /// Create a new ResolutionError for a target
    pub fn resolution_error(message: impl Into<String>, target: impl Into<String>) -> Self {
        HarvestError::ResolutionError {
            message: message.into(),
            target: target.into(),
            source: None,
            not_found: false,
        }
    }

    /// Create a new ResolutionError with source
    pub fn resolution_error_full(
        message: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        HarvestError::ResolutionError {
            message: message.into(),
            target: target.into(),
            source: Some(source.into()),
            not_found: false,
        }
    }

    /// Create a ResolutionError for a lookup that returned no torrents
    pub fn resolution_not_found(message: impl Into<String>, target: impl Into<String>) -> Self {
        HarvestError::ResolutionError {
            message: message.into(),
            target: target.into(),
            source: None,
            not_found: true,
        }
    }

    /// Create a new DiscoveryError
    pub fn discovery_error(message: impl Into<String>) -> Self {
        HarvestError::DiscoveryError {
            message: message.into(),
            info_hash: None,
            source: None,
        }
    }

    /// Create a new DiscoveryError with info hash
    pub fn discovery_error_with_hash(message: impl Into<String>, info_hash: impl Into<String>) -> Self {
        HarvestError::DiscoveryError {
            message: message.into(),
            info_hash: Some(info_hash.into()),
            source: None,
        }
    }

    /// Create a new DiscoveryError with info hash and source
    pub fn discovery_error_full(
        message: impl Into<String>,
        info_hash: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        HarvestError::DiscoveryError {
            message: message.into(),
            info_hash: Some(info_hash.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new PersistenceError
    pub fn persistence_error(message: impl Into<String>) -> Self {
        HarvestError::PersistenceError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new PersistenceError with path and source
    pub fn persistence_error_full(
        message: impl Into<String>,
        path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        HarvestError::PersistenceError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        HarvestError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        HarvestError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        HarvestError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(
        message: impl Into<String>,
        address: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        HarvestError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ParseError
    pub fn parse_error(message: impl Into<String>) -> Self {
        HarvestError::ParseError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ParseError with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        HarvestError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for the errors that only affect a single target of a run
    pub fn is_target_scoped(&self) -> bool {
        matches!(
            self,
            HarvestError::ResolutionError { .. }
                | HarvestError::DiscoveryError { .. }
                | HarvestError::PersistenceError { .. }
        )
    }

    /// True when a resolution came back empty rather than failing
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarvestError::ResolutionError { not_found: true, .. })
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            HarvestError::ResolutionError { source, .. }
            | HarvestError::DiscoveryError { source, .. }
            | HarvestError::PersistenceError { source, .. }
            | HarvestError::NetworkError { source, .. }
            | HarvestError::ParseError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            HarvestError::ConfigError { .. } => {}
        }
        self
    }
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestError::ResolutionError { message, target, source, not_found } => {
                let kind = if *not_found { "Not found" } else { "Resolution error" };
                match source {
                    Some(s) => write!(f, "{}: {} (target: {}, source: {})", kind, message, target, s),
                    None => write!(f, "{}: {} (target: {})", kind, message, target),
                }
            }
            HarvestError::DiscoveryError { message, info_hash, source } => {
                match (info_hash, source) {
                    (Some(h), Some(s)) => write!(f, "Discovery error: {} (info hash: {}, source: {})", message, h, s),
                    (Some(h), None) => write!(f, "Discovery error: {} (info hash: {})", message, h),
                    (None, Some(s)) => write!(f, "Discovery error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Discovery error: {}", message),
                }
            }
            HarvestError::PersistenceError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Persistence error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Persistence error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Persistence error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Persistence error: {}", message),
                }
            }
            HarvestError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            HarvestError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            HarvestError::ParseError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for HarvestError {}

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::persistence_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::parse_error_with_source("Failed to parse JSON data", err.to_string())
    }
}

impl From<serde_bencode::Error> for HarvestError {
    fn from(err: serde_bencode::Error) -> Self {
        HarvestError::parse_error_with_source("Failed to parse bencode data", err.to_string())
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        let address = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
        HarvestError::network_error_full("HTTP request failed", address, err.to_string())
    }
}

impl From<std::net::AddrParseError> for HarvestError {
    fn from(err: std::net::AddrParseError) -> Self {
        HarvestError::network_error_full("Failed to parse address", "unknown".to_string(), err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for HarvestError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HarvestError::network_error("Operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error() {
        let err = HarvestError::resolution_error("lookup failed", "xubuntu14.04");
        assert_eq!(err.to_string(), "Resolution error: lookup failed (target: xubuntu14.04)");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_resolution_not_found() {
        let err = HarvestError::resolution_not_found("no torrents", "ABC123");
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("Not found"));
        assert!(err.to_string().contains("ABC123"));
    }

    #[test]
    fn test_discovery_error_full() {
        let err = HarvestError::discovery_error_full("no peers", "abcdef", "probe disabled");
        assert!(err.to_string().contains("Discovery error"));
        assert!(err.to_string().contains("abcdef"));
        assert!(err.to_string().contains("probe disabled"));
    }

    #[test]
    fn test_persistence_error_full() {
        let err = HarvestError::persistence_error_full("write failed", "/data/x.json", "disk full");
        assert!(err.to_string().contains("Persistence error"));
        assert!(err.to_string().contains("/data/x.json"));
    }

    #[test]
    fn test_target_scoped() {
        assert!(HarvestError::resolution_error("a", "b").is_target_scoped());
        assert!(HarvestError::discovery_error("a").is_target_scoped());
        assert!(HarvestError::persistence_error("a").is_target_scoped());
        assert!(!HarvestError::config_error("a").is_target_scoped());
        assert!(!HarvestError::network_error("a").is_target_scoped());
    }

    #[test]
    fn test_with_context() {
        let err = HarvestError::parse_error("Invalid data").with_context("while reading tracker reply");
        assert!(err.to_string().contains("while reading tracker reply"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: HarvestError = io_err.into();
        assert!(matches!(err, HarvestError::PersistenceError { .. }));
    }

    #[test]
    fn test_from_addr_parse_error() {
        let addr_err = "invalid:address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: HarvestError = addr_err.into();
        assert!(matches!(err, HarvestError::NetworkError { .. }));
    }

    #[test]
    fn test_config_error_with_field() {
        let err = HarvestError::config_error_with_field("must be at least 1", "concurrency");
        assert!(err.to_string().contains("Config error"));
        assert!(err.to_string().contains("concurrency"));
    }
}
