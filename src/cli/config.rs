//! CLI configuration module
//!
//! Run parameters come from a JSON file (every field optional) with
//! command-line overrides applied on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::args::CliArgs;
use crate::error::HarvestError;
use crate::probe::AddressRange;
use crate::torrent::HttpTorrentSource;

/// Network probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    /// CIDR, `a.b.c.d-e.f.g.h` span or single address
    pub range: Option<String>,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub concurrency: usize,
    pub max_hosts: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            range: None,
            port: 6881,
            connect_timeout_ms: 750,
            concurrency: 128,
            max_hosts: 1024,
        }
    }
}

/// Configuration for a harvesting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the torrent search API
    pub api_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Proxy for search API and torrent file requests; a bare `host:port`
    /// means SOCKS5 with remote DNS
    pub proxy: Option<String>,
    /// `.torrent` URL templates, primary first
    pub torrent_sources: Vec<String>,
    /// Where peer records are written
    pub data_dir: PathBuf,
    /// Where target definitions live
    pub targets_dir: PathBuf,
    pub min_peers: usize,
    pub peer_timeout_secs: u64,
    /// Port announced to trackers
    pub listen_port: u16,
    pub use_dht: bool,
    pub dht_bootstrap: Vec<String>,
    pub probe: ProbeConfig,
    /// Targets processed at once; 1 is sequential
    pub concurrency: usize,
    pub run_timeout_secs: Option<u64>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://getstrike.net/api/v2/".to_string(),
            user_agent: format!("peer-harvester/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            proxy: None,
            torrent_sources: vec![
                "https://getstrike.net/torrents/api/download/{HASH}.torrent".to_string(),
                "http://torrage.com/torrent/{HASH}.torrent".to_string(),
            ],
            data_dir: PathBuf::from("data"),
            targets_dir: PathBuf::from("targets"),
            min_peers: 50,
            peer_timeout_secs: 30,
            listen_port: 6881,
            use_dht: true,
            dht_bootstrap: Vec::new(),
            probe: ProbeConfig::default(),
            concurrency: 1,
            run_timeout_secs: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Configuration file {} does not exist, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(HarvestError::config_error(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        debug!("Loading configuration from {}", path.display());
        serde_json::from_slice(&data)
            .map_err(|e| HarvestError::config_error(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Write the configuration, keeping the previous file as `<path>.bk`
    pub fn save(&self, path: &Path) -> Result<(), HarvestError> {
        if path.exists() {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".bk");
            debug!("Backing up {} to {:?}", path.display(), backup);
            std::fs::rename(path, &backup).map_err(|e| {
                HarvestError::config_error(format!("Failed to back up {}: {}", path.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HarvestError::config_error(format!("Failed to serialize configuration: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| HarvestError::config_error(format!("Failed to write {}: {}", path.display(), e)))?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Apply command-line overrides
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(url) = &args.api_url {
            self.api_url = url.clone();
        }
        if let Some(dir) = &args.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(dir) = &args.targets_dir {
            self.targets_dir = dir.clone();
        }
        if let Some(min_peers) = args.min_peers {
            self.min_peers = min_peers;
        }
        if let Some(secs) = args.peer_timeout {
            self.peer_timeout_secs = secs;
        }
        if let Some(concurrency) = args.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(secs) = args.run_timeout {
            self.run_timeout_secs = Some(secs);
        }
        if args.no_dht {
            self.use_dht = false;
        }
        if args.probe {
            self.probe.enabled = true;
        }
        if let Some(range) = &args.probe_range {
            self.probe.range = Some(range.clone());
        }
        if let Some(file) = &args.log_file {
            self.log_file = Some(file.clone());
        }
        if let Some(proxy) = &args.proxy {
            self.proxy = Some(proxy.clone());
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.concurrency == 0 {
            return Err(HarvestError::config_error_with_field("must be at least 1", "concurrency"));
        }
        if self.min_peers == 0 {
            return Err(HarvestError::config_error_with_field("must be at least 1", "min_peers"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(HarvestError::config_error_with_field("cannot be empty", "data_dir"));
        }
        if self.probe.concurrency == 0 {
            return Err(HarvestError::config_error_with_field("must be at least 1", "probe.concurrency"));
        }
        if let Some(range) = self.probe_range()? {
            if range.len() > self.probe.max_hosts {
                return Err(HarvestError::config_error_with_field(
                    format!("{} has {} hosts, more than max_hosts ({})", range, range.len(), self.probe.max_hosts),
                    "probe.range",
                ));
            }
        }
        self.http_proxy()?;
        for template in &self.torrent_sources {
            if !HttpTorrentSource::has_placeholder(template) {
                return Err(HarvestError::config_error_with_field(
                    format!("{} has no {{HASH}} or {{hash}} placeholder", template),
                    "torrent_sources",
                ));
            }
        }
        Ok(())
    }

    /// Proxy URL, with `socks5h://` assumed when no scheme is given
    pub fn proxy_url(&self) -> Option<String> {
        match self.proxy.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(proxy) if proxy.contains("://") => Some(proxy.to_string()),
            Some(proxy) => Some(format!("socks5h://{}", proxy)),
        }
    }

    /// Proxy for outgoing HTTP requests, if one is configured
    pub fn http_proxy(&self) -> Result<Option<reqwest::Proxy>, HarvestError> {
        match self.proxy_url() {
            None => Ok(None),
            Some(url) => reqwest::Proxy::all(url.as_str())
                .map(Some)
                .map_err(|e| HarvestError::config_error_with_field(format!("Invalid proxy {}: {}", url, e), "proxy")),
        }
    }

    /// Parsed probe range, if one is configured
    pub fn probe_range(&self) -> Result<Option<AddressRange>, HarvestError> {
        match self.probe.range.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(range) => range
                .parse()
                .map(Some)
                .map_err(|e: HarvestError| e.with_context("probe.range")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
