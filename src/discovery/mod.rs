//! Peer discovery selector
//!
//! Finds peers for one torrent by escalating through progressively noisier
//! methods. The escalation is an explicit state machine:
//!
//! ```text
//! FetchTorrentFile ──ok──> PeerExchange ──peers──> Done
//!        │                      │
//!        └──all sources fail────┴──no peers──> NetworkProbeFallback ──peers──> Done
//!                                                       │
//!                                                       └──────────────────> Failed
//! ```
//!
//! A stage only escalates on failure; partial success is final.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::HarvestError;
use crate::exchange::PeerExchange;
use crate::peer::PeerSet;
use crate::probe::{AddressRange, NetworkProbe};
use crate::search::TorrentRecord;
use crate::torrent::{TorrentParser, TorrentSource};

/// How a peer set was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    PeerExchange,
    NetworkProbe,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMethod::PeerExchange => write!(f, "peer exchange"),
            DiscoveryMethod::NetworkProbe => write!(f, "network probe"),
        }
    }
}

/// Successful discovery result
#[derive(Debug, Clone)]
pub struct DiscoveredPeers {
    pub peers: PeerSet,
    pub method: DiscoveryMethod,
    /// Source that supplied the torrent file, if one was used
    pub torrent_source: Option<String>,
}

/// Discovery state for one torrent
#[derive(Debug)]
pub enum DiscoveryStage {
    FetchTorrentFile,
    PeerExchange { metainfo: Bytes, source: String },
    NetworkProbeFallback { reason: String },
    Done(DiscoveredPeers),
    Failed { reason: String },
}

impl DiscoveryStage {
    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryStage::FetchTorrentFile => "fetch-torrent-file",
            DiscoveryStage::PeerExchange { .. } => "peer-exchange",
            DiscoveryStage::NetworkProbeFallback { .. } => "network-probe",
            DiscoveryStage::Done(_) => "done",
            DiscoveryStage::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DiscoveryStage::Done(_) | DiscoveryStage::Failed { .. })
    }
}

/// Tunables for the selector
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub min_peers: usize,
    pub peer_timeout: Duration,
    pub probe_enabled: bool,
    /// Fixed probe range; when unset, ranges come from hint peers
    pub probe_range: Option<AddressRange>,
    pub probe_port: u16,
    /// Hosts one target may sweep in total
    pub probe_max_hosts: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            min_peers: 50,
            peer_timeout: Duration::from_secs(30),
            probe_enabled: false,
            probe_range: None,
            probe_port: 6881,
            probe_max_hosts: 1024,
        }
    }
}

/// Probe work for one target, shared by all of its torrents.
///
/// The ranges are fixed when the plan is made and swept at most once; later
/// torrents of the same target reuse the hosts found by the first sweep.
#[derive(Debug, Default)]
pub struct ProbePlan {
    ranges: Vec<AddressRange>,
    swept: Option<PeerSet>,
}

impl ProbePlan {
    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    pub fn total_hosts(&self) -> u64 {
        self.ranges.iter().map(AddressRange::len).sum()
    }
}

/// Peer Discovery Selector
pub struct DiscoverySelector {
    sources: Vec<Arc<dyn TorrentSource>>,
    exchange: Arc<dyn PeerExchange>,
    probe: Arc<dyn NetworkProbe>,
    settings: DiscoverySettings,
}

impl DiscoverySelector {
    /// `sources` are tried in order: primary first, then mirrors
    pub fn new(
        sources: Vec<Arc<dyn TorrentSource>>,
        exchange: Arc<dyn PeerExchange>,
        probe: Arc<dyn NetworkProbe>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            sources,
            exchange,
            probe,
            settings,
        }
    }

    /// Discover peers for a torrent.
    ///
    /// `plan` comes from [`plan_probe`](Self::plan_probe) for the owning
    /// target and is only used if the probe fallback is reached.
    pub async fn discover_peers(
        &self,
        torrent: &TorrentRecord,
        plan: &mut ProbePlan,
    ) -> Result<DiscoveredPeers, HarvestError> {
        let mut stage = DiscoveryStage::FetchTorrentFile;
        loop {
            stage = match stage {
                DiscoveryStage::Done(found) => {
                    info!(
                        "{}: {} peers via {}",
                        torrent.info_hash,
                        found.peers.len(),
                        found.method
                    );
                    return Ok(found);
                }
                DiscoveryStage::Failed { reason } => {
                    warn!("{}: discovery failed: {}", torrent.info_hash, reason);
                    return Err(HarvestError::discovery_error_with_hash(reason, &torrent.info_hash));
                }
                current => {
                    let next = self.advance(current, torrent, plan).await;
                    debug!("{}: -> {}", torrent.info_hash, next.name());
                    next
                }
            };
        }
    }

    /// Run one stage and return the next
    pub async fn advance(&self, stage: DiscoveryStage, torrent: &TorrentRecord, plan: &mut ProbePlan) -> DiscoveryStage {
        match stage {
            DiscoveryStage::FetchTorrentFile => self.fetch_torrent_file(&torrent.info_hash).await,
            DiscoveryStage::PeerExchange { metainfo, source } => self.exchange_peers(metainfo, source).await,
            DiscoveryStage::NetworkProbeFallback { reason } => self.probe_network(reason, plan).await,
            terminal => terminal,
        }
    }

    async fn fetch_torrent_file(&self, info_hash: &str) -> DiscoveryStage {
        if self.sources.is_empty() {
            return DiscoveryStage::NetworkProbeFallback {
                reason: "no torrent sources configured".to_string(),
            };
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            let body = match source.fetch(info_hash).await {
                Ok(body) => body,
                Err(e) => {
                    debug!("{} has no torrent for {}: {:#}", source.name(), info_hash, e);
                    failures.push(format!("{}: {:#}", source.name(), e));
                    continue;
                }
            };
            match TorrentParser::parse_bytes(&body) {
                Ok(info) if info.matches_hash(info_hash) => {
                    info!("Fetched torrent file for {} from {}", info_hash, source.name());
                    return DiscoveryStage::PeerExchange {
                        metainfo: body,
                        source: source.name().to_string(),
                    };
                }
                Ok(info) => {
                    warn!(
                        "{} served torrent {} when asked for {}",
                        source.name(),
                        info.info_hash_hex(),
                        info_hash
                    );
                    failures.push(format!("{}: info hash mismatch", source.name()));
                }
                Err(e) => {
                    warn!("{} served an unreadable torrent file: {:#}", source.name(), e);
                    failures.push(format!("{}: unreadable torrent file", source.name()));
                }
            }
        }

        DiscoveryStage::NetworkProbeFallback {
            reason: format!("no torrent file ({})", failures.join("; ")),
        }
    }

    async fn exchange_peers(&self, metainfo: Bytes, source: String) -> DiscoveryStage {
        match self
            .exchange
            .discover(&metainfo, self.settings.min_peers, self.settings.peer_timeout)
            .await
        {
            Ok(peers) if !peers.is_empty() => DiscoveryStage::Done(DiscoveredPeers {
                peers: peers.into_iter().collect(),
                method: DiscoveryMethod::PeerExchange,
                torrent_source: Some(source),
            }),
            Ok(_) => DiscoveryStage::NetworkProbeFallback {
                reason: "peer exchange found no peers".to_string(),
            },
            Err(e) => DiscoveryStage::NetworkProbeFallback {
                reason: format!("peer exchange failed: {:#}", e),
            },
        }
    }

    /// Ranges to sweep for one target: the configured one, else the /24s
    /// of the hints in address order, until `probe_max_hosts` is used up
    pub fn plan_probe(&self, hints: &PeerSet) -> ProbePlan {
        if !self.settings.probe_enabled {
            return ProbePlan::default();
        }
        if let Some(range) = self.settings.probe_range {
            return ProbePlan {
                ranges: vec![range],
                swept: None,
            };
        }

        let candidates: BTreeSet<AddressRange> = hints
            .iter()
            .filter_map(|peer| AddressRange::around(peer.ip))
            .collect();
        let mut ranges = Vec::new();
        let mut budget = self.settings.probe_max_hosts;
        for range in &candidates {
            if range.len() > budget {
                break;
            }
            budget -= range.len();
            ranges.push(*range);
        }
        if ranges.len() < candidates.len() {
            warn!(
                "Probing {} of {} hint networks, limit is {} hosts",
                ranges.len(),
                candidates.len(),
                self.settings.probe_max_hosts
            );
        }

        ProbePlan { ranges, swept: None }
    }

    async fn probe_network(&self, reason: String, plan: &mut ProbePlan) -> DiscoveryStage {
        if !self.settings.probe_enabled {
            return DiscoveryStage::Failed {
                reason: format!("{}; network probe disabled", reason),
            };
        }

        if plan.ranges.is_empty() {
            return DiscoveryStage::Failed {
                reason: format!("{}; no probe range configured and no hint peers", reason),
            };
        }

        let found = match &plan.swept {
            Some(found) => {
                debug!("Reusing {} hosts from this target's earlier sweep", found.len());
                found.clone()
            }
            None => {
                let mut found = PeerSet::new();
                for range in &plan.ranges {
                    match self.probe.probe(range, self.settings.probe_port).await {
                        Ok(peers) => found.extend(peers),
                        Err(e) => warn!("Probe of {} failed: {:#}", range, e),
                    }
                }
                plan.swept = Some(found.clone());
                found
            }
        };

        if found.is_empty() {
            DiscoveryStage::Failed {
                reason: format!("{}; network probe found no hosts", reason),
            }
        } else {
            DiscoveryStage::Done(DiscoveredPeers {
                peers: found,
                method: DiscoveryMethod::NetworkProbe,
                torrent_source: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::peer::Peer;
    use crate::testing::{peers, FakeExchange, FakeProbe, FakeSource, SAMPLE_TORRENT, SAMPLE_TORRENT_HASH};

    struct Harness {
        primary: Arc<FakeSource>,
        mirror: Arc<FakeSource>,
        exchange: Arc<FakeExchange>,
        probe: Arc<FakeProbe>,
        selector: DiscoverySelector,
    }

    fn harness(primary: FakeSource, mirror: FakeSource, exchange: FakeExchange, settings: DiscoverySettings) -> Harness {
        let primary = Arc::new(primary);
        let mirror = Arc::new(mirror);
        let exchange = Arc::new(exchange);
        let probe = Arc::new(FakeProbe::returning(peers(&["10.0.0.7:6881"])));
        let selector = DiscoverySelector::new(
            vec![primary.clone() as Arc<dyn TorrentSource>, mirror.clone()],
            exchange.clone(),
            probe.clone(),
            settings,
        );
        Harness {
            primary,
            mirror,
            exchange,
            probe,
            selector,
        }
    }

    fn probing() -> DiscoverySettings {
        DiscoverySettings {
            probe_enabled: true,
            probe_range: Some("10.0.0.0/29".parse().unwrap()),
            ..Default::default()
        }
    }

    fn record() -> TorrentRecord {
        TorrentRecord::new(SAMPLE_TORRENT_HASH.to_uppercase(), "demo")
    }

    #[tokio::test]
    async fn test_primary_source_then_exchange() {
        let h = harness(
            FakeSource::serving("primary", SAMPLE_TORRENT),
            FakeSource::serving("mirror", SAMPLE_TORRENT),
            FakeExchange::returning(peers(&["1.2.3.4:51413", "5.6.7.8:6881"])),
            probing(),
        );

        let found = h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap();
        assert_eq!(found.method, DiscoveryMethod::PeerExchange);
        assert_eq!(found.torrent_source.as_deref(), Some("primary"));
        assert_eq!(found.peers.len(), 2);
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.mirror.calls(), 0);
        assert!(h.probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_used_when_primary_fails() {
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::serving("mirror", SAMPLE_TORRENT),
            FakeExchange::returning(peers(&["1.2.3.4:51413"])),
            DiscoverySettings::default(),
        );

        let found = h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap();
        assert_eq!(found.torrent_source.as_deref(), Some("mirror"));
        assert_eq!(h.primary.calls(), 1);
        assert_eq!(h.mirror.calls(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_torrent_file_rejected() {
        let h = harness(
            FakeSource::serving("primary", SAMPLE_TORRENT),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(peers(&["1.2.3.4:51413"])),
            DiscoverySettings::default(),
        );

        let other = TorrentRecord::new("0".repeat(40), "other");
        let err = h.selector.discover_peers(&other, &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap_err();
        assert!(err.to_string().contains("mismatch"));
        assert_eq!(h.exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_probe() {
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(peers(&["1.2.3.4:51413"])),
            probing(),
        );

        let found = h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap();
        assert_eq!(found.method, DiscoveryMethod::NetworkProbe);
        assert_eq!(found.torrent_source, None);
        assert_eq!(h.exchange.calls(), 0);
        assert_eq!(h.probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_exchange_falls_back_to_probe() {
        let h = harness(
            FakeSource::serving("primary", SAMPLE_TORRENT),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            probing(),
        );

        let found = h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap();
        assert_eq!(found.method, DiscoveryMethod::NetworkProbe);
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_never_runs_after_exchange_success() {
        let h = harness(
            FakeSource::serving("primary", SAMPLE_TORRENT),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(peers(&["1.2.3.4:51413"])),
            probing(),
        );

        h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap();
        assert!(h.probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_everything_fails_without_probe() {
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::failing("unreachable"),
            DiscoverySettings::default(),
        );

        let err = h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap_err();
        assert!(matches!(err, HarvestError::DiscoveryError { .. }));
        assert!(err.is_target_scoped());
        assert!(h.probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_probe_ranges_from_hints() {
        let settings = DiscoverySettings {
            probe_enabled: true,
            probe_port: 51413,
            ..Default::default()
        };
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            settings,
        );

        let hints: PeerSet = peers(&["5.6.7.8:6881", "5.6.7.99:1", "9.9.9.9:6881"]).into_iter().collect();
        h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&hints)).await.unwrap();

        let calls = h.probe.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(_, port)| *port == 51413));
        assert_eq!(calls[0].0.to_string(), "5.6.7.1-5.6.7.254");
    }

    #[test]
    fn test_hint_ranges_stay_within_host_limit() {
        let settings = DiscoverySettings {
            probe_enabled: true,
            ..Default::default()
        };
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            settings,
        );

        let hints: PeerSet = (0..2000u32)
            .map(|i| Peer::new(IpAddr::V4(Ipv4Addr::from((10 << 24) | (i << 8) | 7)), 6881))
            .collect();
        let plan = h.selector.plan_probe(&hints);

        assert_eq!(plan.ranges().len(), 4);
        assert!(plan.total_hosts() <= 1024);
    }

    #[tokio::test]
    async fn test_probe_sweeps_once_per_plan() {
        let settings = DiscoverySettings {
            probe_enabled: true,
            ..Default::default()
        };
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            settings,
        );

        let hints: PeerSet = peers(&["5.6.7.8:6881", "9.9.9.9:6881"]).into_iter().collect();
        let mut plan = h.selector.plan_probe(&hints);
        let first = h.selector.discover_peers(&record(), &mut plan).await.unwrap();
        let second = h
            .selector
            .discover_peers(&TorrentRecord::new("1".repeat(40), "other"), &mut plan)
            .await
            .unwrap();

        assert_eq!(first.peers, second.peers);
        assert_eq!(h.probe.calls().len(), 2);
    }

    #[test]
    fn test_disabled_probe_plans_nothing() {
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            DiscoverySettings::default(),
        );
        let hints: PeerSet = peers(&["5.6.7.8:6881"]).into_iter().collect();
        assert!(h.selector.plan_probe(&hints).ranges().is_empty());
    }

    #[tokio::test]
    async fn test_probe_without_range_or_hints_fails() {
        let settings = DiscoverySettings {
            probe_enabled: true,
            ..Default::default()
        };
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            settings,
        );

        let err = h.selector.discover_peers(&record(), &mut h.selector.plan_probe(&PeerSet::new())).await.unwrap_err();
        assert!(err.to_string().contains("no probe range"));
        assert!(h.probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_advance_leaves_terminal_stages_alone() {
        let h = harness(
            FakeSource::unavailable("primary"),
            FakeSource::unavailable("mirror"),
            FakeExchange::returning(Vec::new()),
            DiscoverySettings::default(),
        );
        let stage = DiscoveryStage::Failed {
            reason: "x".to_string(),
        };
        let next = h.selector.advance(stage, &record(), &mut ProbePlan::default()).await;
        assert!(next.is_terminal());
        assert_eq!(h.primary.calls(), 0);
    }
}
