//! Report display module
//!
//! Human-readable output for resolved torrents and run summaries.

use std::io::{self, Write};
use std::time::Duration;

use crate::pipeline::{RunReport, TargetOutcome};
use crate::search::TorrentRecord;

/// Console output for the CLI
pub struct ReportDisplay {
    /// Quiet mode (only errors)
    quiet: bool,
}

impl ReportDisplay {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// One line per torrent
    pub fn torrent_lines(torrents: &[TorrentRecord]) -> Vec<String> {
        torrents
            .iter()
            .map(|t| {
                format!(
                    "{}  {:>10}  S:{:<5} L:{:<5} {}",
                    t.info_hash,
                    Self::format_bytes(t.size),
                    t.seeders,
                    t.leechers,
                    t.name
                )
            })
            .collect()
    }

    /// One line per target plus a totals line
    pub fn summary_lines(report: &RunReport) -> Vec<String> {
        let mut lines: Vec<String> = report
            .targets
            .iter()
            .map(|t| {
                let detail = match &t.outcome {
                    TargetOutcome::Succeeded {
                        torrents,
                        failed_torrents,
                        added,
                        total,
                        ..
                    } => {
                        let mut s = format!("ok: {} new, {} total peers from {} torrent(s)", added, total, torrents);
                        if *failed_torrents > 0 {
                            s.push_str(&format!(" ({} without peers)", failed_torrents));
                        }
                        s
                    }
                    TargetOutcome::Resolved { torrents } => format!("resolved {} torrent(s)", torrents.len()),
                    TargetOutcome::Failed { stage, error } => format!("FAILED in {}: {}", stage, error),
                    TargetOutcome::Cancelled => "cancelled".to_string(),
                };
                format!("  {:<24} {} [{}]", t.target.name, detail, Self::format_duration(t.elapsed))
            })
            .collect();
        lines.extend(report.rejected.iter().map(|r| format!("  REJECTED {}", r)));

        let mut totals = format!(
            "{} target(s): {} succeeded, {} failed, {} cancelled, {} new peer(s) in {}",
            report.targets.len(),
            report.succeeded(),
            report.failed(),
            report.cancelled(),
            report.peers_added(),
            Self::format_duration(report.elapsed)
        );
        if !report.rejected.is_empty() {
            totals.push_str(&format!(", {} rejected definition(s)", report.rejected.len()));
        }
        lines.push(totals);
        lines
    }

    /// Print resolved torrents
    pub fn print_torrents(&self, heading: &str, torrents: &[TorrentRecord]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        writeln!(out, "{}", heading)?;
        for line in Self::torrent_lines(torrents) {
            writeln!(out, "  {}", line)?;
        }
        Ok(())
    }

    /// Print the run summary; failures go to stderr even in quiet mode
    pub fn print_summary(&self, report: &RunReport) -> io::Result<()> {
        for target in &report.targets {
            if let TargetOutcome::Resolved { torrents } = &target.outcome {
                self.print_torrents(&format!("{}:", target.target), torrents)?;
            }
        }

        if self.quiet {
            if report.has_failures() {
                let lines = Self::summary_lines(report);
                if let Some(totals) = lines.last() {
                    eprintln!("{}", totals);
                }
            }
            return Ok(());
        }

        let mut out = io::stdout().lock();
        writeln!(out)?;
        writeln!(out, "Run summary:")?;
        for line in Self::summary_lines(report) {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// Print a plain message
    pub fn print_message(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        println!("{}", message);
        Ok(())
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::pipeline::{PipelineStage, TargetReport};
    use crate::target::{RejectedDefinition, Target};

    #[test]
    fn test_format_bytes() {
        assert_eq!(ReportDisplay::format_bytes(0), "0.00 B");
        assert_eq!(ReportDisplay::format_bytes(1024), "1.00 KB");
        assert_eq!(ReportDisplay::format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(ReportDisplay::format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(ReportDisplay::format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(ReportDisplay::format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_torrent_lines() {
        let mut record = TorrentRecord::new("ABC", "xubuntu-14.04-desktop-amd64.iso");
        record.size = 1024 * 1024;
        record.seeders = 12;
        let lines = ReportDisplay::torrent_lines(&[record]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ABC"));
        assert!(lines[0].contains("1.00 MB"));
        assert!(lines[0].contains("S:12"));
        assert!(lines[0].ends_with("xubuntu-14.04-desktop-amd64.iso"));
    }

    #[test]
    fn test_summary_lines() {
        let report = RunReport {
            targets: vec![
                TargetReport {
                    target: Target::from_query("xubuntu14.04", "xubuntu 14.04"),
                    outcome: TargetOutcome::Succeeded {
                        torrents: 1,
                        failed_torrents: 0,
                        discovered: 2,
                        added: 2,
                        total: 2,
                    },
                    elapsed: Duration::from_secs(3),
                },
                TargetReport {
                    target: Target::from_hash("missing", "ABC123"),
                    outcome: TargetOutcome::Failed {
                        stage: PipelineStage::Resolve,
                        error: HarvestError::resolution_not_found("No torrents matched", "missing"),
                    },
                    elapsed: Duration::from_secs(1),
                },
            ],
            rejected: Vec::new(),
            elapsed: Duration::from_secs(4),
        };

        let lines = ReportDisplay::summary_lines(&report);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("ok: 2 new, 2 total peers"));
        assert!(lines[1].contains("FAILED in resolution"));
        assert!(lines[2].starts_with("2 target(s): 1 succeeded, 1 failed, 0 cancelled, 2 new peer(s)"));
    }

    #[test]
    fn test_summary_lines_list_rejected_definitions() {
        let report = RunReport {
            targets: Vec::new(),
            rejected: vec![RejectedDefinition {
                source: "targets/zbad.json".to_string(),
                reason: "definition has neither a query nor a hash".to_string(),
            }],
            elapsed: Duration::ZERO,
        };

        let lines = ReportDisplay::summary_lines(&report);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("REJECTED targets/zbad.json"));
        assert!(lines[1].ends_with(", 1 rejected definition(s)"));
    }
}
