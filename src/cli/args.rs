//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI arguments for the peer harvester
#[derive(Debug, Parser)]
#[command(name = "peer-harvester", version)]
#[command(
    about = "Find torrents for named targets and harvest the peers of their swarms",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.json", global = true)]
    pub config: PathBuf,

    /// Target definition to process (loads TARGETS_DIR/NAME.json); repeatable
    #[arg(short = 't', long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Process every target definition in the targets directory
    #[arg(long)]
    pub all_targets: bool,

    /// Ad-hoc search query for this run only; repeatable
    #[arg(short = 'q', long = "query", value_name = "TEXT")]
    pub queries: Vec<String>,

    /// Ad-hoc info hash for this run only; repeatable
    #[arg(long = "hash", value_name = "HASH")]
    pub hashes: Vec<String>,

    /// Stop after resolving targets and list the torrents found
    #[arg(long)]
    pub resolve_only: bool,

    /// Search API base URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Directory for peer records
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding target definitions
    #[arg(long, value_name = "DIR")]
    pub targets_dir: Option<PathBuf>,

    /// Stop peer exchange once this many peers are known
    #[arg(long, value_name = "N")]
    pub min_peers: Option<usize>,

    /// Peer exchange timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub peer_timeout: Option<u64>,

    /// Number of targets processed at once
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Stop starting new targets after this many seconds
    #[arg(long, value_name = "SECS")]
    pub run_timeout: Option<u64>,

    /// Disable DHT peer discovery
    #[arg(long)]
    pub no_dht: bool,

    /// Enable the network probe fallback
    #[arg(long)]
    pub probe: bool,

    /// Address range for the network probe
    #[arg(long, value_name = "RANGE")]
    pub probe_range: Option<String>,

    /// SOCKS5 proxy (`host:port` or a proxy URL) for the search API and torrent downloads
    #[arg(long, value_name = "ADDR")]
    pub proxy: Option<String>,

    /// Also append log output to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    pub save_config: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Commands other than the default peer run
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the description of a torrent
    Describe {
        /// Info hash
        hash: String,
    },
    /// List the top torrents of a category
    Top {
        category: String,
        #[arg(long)]
        subcategory: Option<String>,
    },
    /// Print how many torrents the search API knows about
    Count,
    /// Write a target definition file
    NewTarget {
        name: String,
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        query: Option<String>,
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        subcategory: Option<String>,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether the run names any target at all
    pub fn has_targets(&self) -> bool {
        self.all_targets || !self.targets.is_empty() || !self.queries.is_empty() || !self.hashes.is_empty()
    }

    /// Get the log level: flags win over the configured level
    pub fn log_level(&self, configured: &str) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            configured.parse().unwrap_or(tracing::Level::INFO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = CliArgs::parse_from(["peer-harvester"]);
        assert!(args.command.is_none());
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(!args.has_targets());
        assert_eq!(args.log_level("warn"), tracing::Level::WARN);
        assert_eq!(args.log_level("bogus"), tracing::Level::INFO);
    }

    #[test]
    fn test_repeatable_targets() {
        let args = CliArgs::parse_from([
            "peer-harvester",
            "-t",
            "xubuntu14.04",
            "-t",
            "debian",
            "-q",
            "xubuntu 14.04",
            "--hash",
            "ABC123",
            "-v",
        ]);
        assert_eq!(args.targets, vec!["xubuntu14.04", "debian"]);
        assert_eq!(args.queries, vec!["xubuntu 14.04"]);
        assert_eq!(args.hashes, vec!["ABC123"]);
        assert!(args.has_targets());
        assert_eq!(args.log_level("error"), tracing::Level::DEBUG);
    }

    #[test]
    fn test_new_target_needs_query_or_hash() {
        assert!(CliArgs::try_parse_from(["peer-harvester", "new-target", "x"]).is_err());
        assert!(CliArgs::try_parse_from(["peer-harvester", "new-target", "x", "--query", "a", "--hash", "b"]).is_err());

        let args = CliArgs::parse_from(["peer-harvester", "new-target", "x", "--hash", "ABC"]);
        match args.command {
            Some(Command::NewTarget { name, hash, .. }) => {
                assert_eq!(name, "x");
                assert_eq!(hash.as_deref(), Some("ABC"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_top_subcommand() {
        let args = CliArgs::parse_from(["peer-harvester", "top", "Anime", "--subcategory", "Subbed"]);
        assert!(matches!(
            args.command,
            Some(Command::Top { ref category, ref subcategory })
                if category == "Anime" && subcategory.as_deref() == Some("Subbed")
        ));
    }
}
