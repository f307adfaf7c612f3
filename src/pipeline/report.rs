//! Per-target outcomes and the run summary

use std::fmt;
use std::time::Duration;

use crate::error::HarvestError;
use crate::search::TorrentRecord;
use crate::target::{RejectedDefinition, Target};

/// Pipeline stage a target failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Resolve,
    Discover,
    Persist,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Resolve => write!(f, "resolution"),
            PipelineStage::Discover => write!(f, "peer discovery"),
            PipelineStage::Persist => write!(f, "persistence"),
        }
    }
}

/// What happened to one target
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    /// Peers were discovered and merged into the target's record
    Succeeded {
        torrents: usize,
        /// Torrents for which no method found peers
        failed_torrents: usize,
        discovered: usize,
        added: usize,
        total: usize,
    },
    /// Resolution only run
    Resolved { torrents: Vec<TorrentRecord> },
    Failed { stage: PipelineStage, error: HarvestError },
    /// Not finished before shutdown or the run timeout
    Cancelled,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Succeeded { .. } | TargetOutcome::Resolved { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: Target,
    pub outcome: TargetOutcome,
    pub elapsed: Duration,
}

/// Summary of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
    /// Definitions skipped before the run started
    pub rejected: Vec<RejectedDefinition>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.targets.iter().filter(|t| t.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::Failed { .. }))
            .count()
    }

    pub fn cancelled(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::Cancelled))
            .count()
    }

    /// Peers added across all targets
    pub fn peers_added(&self) -> usize {
        self.targets
            .iter()
            .map(|t| match t.outcome {
                TargetOutcome::Succeeded { added, .. } => added,
                _ => 0,
            })
            .sum()
    }

    /// True when any target failed, was cancelled or could not be loaded
    pub fn has_failures(&self) -> bool {
        !self.rejected.is_empty() || self.targets.iter().any(|t| !t.outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: TargetOutcome) -> TargetReport {
        TargetReport {
            target: Target::from_query("t", "q"),
            outcome,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_counts() {
        let run = RunReport {
            targets: vec![
                report(TargetOutcome::Succeeded {
                    torrents: 2,
                    failed_torrents: 1,
                    discovered: 5,
                    added: 3,
                    total: 7,
                }),
                report(TargetOutcome::Failed {
                    stage: PipelineStage::Resolve,
                    error: HarvestError::resolution_not_found("No torrents matched", "t"),
                }),
                report(TargetOutcome::Cancelled),
            ],
            rejected: Vec::new(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(run.succeeded(), 1);
        assert_eq!(run.failed(), 1);
        assert_eq!(run.cancelled(), 1);
        assert_eq!(run.peers_added(), 3);
        assert!(run.has_failures());
    }

    #[test]
    fn test_empty_run_has_no_failures() {
        assert!(!RunReport::default().has_failures());
    }

    #[test]
    fn test_rejected_definition_is_a_failure() {
        let run = RunReport {
            targets: vec![report(TargetOutcome::Resolved { torrents: Vec::new() })],
            rejected: vec![RejectedDefinition {
                source: "targets/zbad.json".to_string(),
                reason: "definition has neither a query nor a hash".to_string(),
            }],
            elapsed: Duration::ZERO,
        };
        assert_eq!(run.succeeded(), 1);
        assert!(run.has_failures());
    }
}
