//! CLI module
//!
//! Command-line interface for the peer harvester.

pub mod args;
pub mod config;
pub mod report;

pub use args::{CliArgs, Command};
pub use config::{Config, ProbeConfig};
pub use report::ReportDisplay;
