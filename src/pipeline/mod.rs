//! Pipeline driver
//!
//! Runs every target through Resolve -> Discover -> Merge/Persist and
//! collects one outcome per target. A failing target never stops the run.

pub mod report;

use std::future::{self, Future};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::cli::Config;
use crate::discovery::{DiscoverySelector, DiscoverySettings};
use crate::error::HarvestError;
use crate::exchange::SwarmExchange;
use crate::peer::PeerSet;
use crate::probe::TcpProbe;
use crate::resolve::Resolver;
use crate::search::{SearchApi, SearchClient};
use crate::store::PeerStore;
use crate::target::Target;
use crate::torrent::{HttpTorrentSource, TorrentSource};

pub use report::{PipelineStage, RunReport, TargetOutcome, TargetReport};

/// Driver settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Targets processed at once; 1 is sequential
    pub concurrency: usize,
    /// Stop starting new targets after this long
    pub run_timeout: Option<Duration>,
    /// Stop after resolution
    pub resolve_only: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            run_timeout: None,
            resolve_only: false,
        }
    }
}

fn empty_slots(len: usize) -> Vec<Option<TargetReport>> {
    (0..len).map(|_| None).collect()
}

/// Pipeline Driver
pub struct Pipeline {
    resolver: Resolver,
    selector: DiscoverySelector,
    store: Arc<PeerStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        resolver: Resolver,
        selector: DiscoverySelector,
        store: Arc<PeerStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver,
            selector,
            store,
            settings,
        }
    }

    /// Wire the production collaborators from a configuration
    pub fn from_config(config: &Config, resolve_only: bool) -> Result<Self> {
        let proxy = config.http_proxy()?;
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout());
        if let Some(proxy) = proxy.clone() {
            builder = builder.proxy(proxy);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let api: Arc<dyn SearchApi> = Arc::new(SearchClient::new(
            &config.api_url,
            &config.user_agent,
            config.request_timeout(),
            proxy,
        )?);

        let sources = config
            .torrent_sources
            .iter()
            .map(|template| {
                HttpTorrentSource::new(template, client.clone()).map(|s| Arc::new(s) as Arc<dyn TorrentSource>)
            })
            .collect::<Result<Vec<_>>>()?;

        // Tracker announces and DHT traffic always go direct
        let tracker_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout())
            .no_proxy()
            .build()
            .context("Failed to build tracker HTTP client")?;
        let exchange = Arc::new(SwarmExchange::new(
            tracker_client,
            config.listen_port,
            config.use_dht,
            config.dht_bootstrap.clone(),
        ));
        let probe = Arc::new(TcpProbe::new(
            Duration::from_millis(config.probe.connect_timeout_ms),
            config.probe.concurrency,
            config.probe.max_hosts,
        ));

        let discovery = DiscoverySettings {
            min_peers: config.min_peers,
            peer_timeout: config.peer_timeout(),
            probe_enabled: config.probe.enabled,
            probe_range: config.probe_range()?,
            probe_port: config.probe.port,
            probe_max_hosts: config.probe.max_hosts,
        };
        let settings = PipelineSettings {
            concurrency: config.concurrency,
            run_timeout: config.run_timeout(),
            resolve_only,
        };

        Ok(Self::new(
            Resolver::new(api),
            DiscoverySelector::new(sources, exchange, probe, discovery),
            Arc::new(PeerStore::new(&config.data_dir)),
            settings,
        ))
    }

    /// Run all targets to completion (or the run timeout)
    pub async fn run(&self, targets: Vec<Target>) -> RunReport {
        self.run_until(targets, future::pending()).await
    }

    /// Run all targets until `shutdown` resolves or the run timeout expires.
    ///
    /// Targets not finished by then are reported as cancelled; their
    /// in-flight work is dropped.
    pub async fn run_until<F>(&self, targets: Vec<Target>, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        info!(
            "Processing {} target(s), {} at a time",
            targets.len(),
            self.settings.concurrency
        );

        let run_timeout = self.settings.run_timeout;
        let stop = async move {
            let deadline = async {
                match run_timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => future::pending().await,
                }
            };
            tokio::select! {
                _ = shutdown => warn!("Shutdown requested, no new targets will be started"),
                _ = deadline => warn!("Run timeout reached, no new targets will be started"),
            }
        };

        let mut finished: Vec<Option<TargetReport>> = stream::iter(targets.iter().enumerate())
            .map(|(index, target)| async move { (index, self.process_target(target).await) })
            .buffer_unordered(self.settings.concurrency.max(1))
            .take_until(stop)
            .fold(empty_slots(targets.len()), |mut slots, (index, report)| async move {
                slots[index] = Some(report);
                slots
            })
            .await;

        let reports = targets
            .into_iter()
            .zip(finished.iter_mut())
            .map(|(target, slot)| {
                slot.take().unwrap_or_else(|| TargetReport {
                    target,
                    outcome: TargetOutcome::Cancelled,
                    elapsed: Duration::ZERO,
                })
            })
            .collect();

        RunReport {
            targets: reports,
            rejected: Vec::new(),
            elapsed: started.elapsed(),
        }
    }

    /// Process one target end to end
    pub async fn process_target(&self, target: &Target) -> TargetReport {
        let started = Instant::now();
        info!("Processing target {}", target);

        let outcome = self.process(target).await;
        match &outcome {
            TargetOutcome::Failed { stage, error } => error!("{}: {} failed: {}", target.name, stage, error),
            outcome => debug!("{}: {:?}", target.name, outcome),
        }

        TargetReport {
            target: target.clone(),
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn process(&self, target: &Target) -> TargetOutcome {
        let torrents = match self.resolver.resolve(target).await {
            Ok(torrents) => torrents,
            Err(error) => {
                return TargetOutcome::Failed {
                    stage: PipelineStage::Resolve,
                    error,
                }
            }
        };
        if self.settings.resolve_only {
            return TargetOutcome::Resolved { torrents };
        }

        let hints = match self.store.load(target).await {
            Ok(Some(record)) => record.peers,
            Ok(None) => PeerSet::new(),
            Err(e) => {
                warn!("{}: stored peers unavailable as hints: {}", target.name, e);
                PeerSet::new()
            }
        };
        let mut probe_plan = self.selector.plan_probe(&hints);

        let mut discovered = PeerSet::new();
        let mut contributing = Vec::new();
        let mut failures: Vec<HarvestError> = Vec::new();
        for torrent in &torrents {
            match self.selector.discover_peers(torrent, &mut probe_plan).await {
                Ok(found) => {
                    discovered.extend(found.peers);
                    contributing.push(torrent.info_hash.clone());
                }
                Err(e) => failures.push(e),
            }
        }

        if discovered.is_empty() {
            let error = if failures.len() == 1 {
                failures.remove(0)
            } else {
                HarvestError::discovery_error(format!("No peers found for any of {} torrent(s)", torrents.len()))
            };
            return TargetOutcome::Failed {
                stage: PipelineStage::Discover,
                error: error.with_context(format!("target {}", target.name)),
            };
        }

        match self.store.merge_and_persist(target, &contributing, &discovered).await {
            Ok(merge) => TargetOutcome::Succeeded {
                torrents: torrents.len(),
                failed_torrents: failures.len(),
                discovered: discovered.len(),
                added: merge.added,
                total: merge.record.peers.len(),
            },
            Err(error) => TargetOutcome::Failed {
                stage: PipelineStage::Persist,
                error,
            },
        }
    }
}
