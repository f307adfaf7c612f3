//! Target definition loader
//!
//! Reads and writes `<targets_dir>/<name>.json` definition files.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, error, info};

use crate::target::{sanitize_file_stem, Target, TargetDefinition};

/// A definition that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDefinition {
    /// Definition path or requested name
    pub source: String,
    pub reason: String,
}

impl fmt::Display for RejectedDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Targets read from definition files, plus the ones that were skipped
#[derive(Debug, Clone, Default)]
pub struct LoadedTargets {
    pub targets: Vec<Target>,
    pub rejected: Vec<RejectedDefinition>,
}

impl LoadedTargets {
    fn record(&mut self, source: String, result: Result<Target>) {
        match result {
            Ok(target) => self.targets.push(target),
            Err(e) => {
                error!("Skipping target definition {}: {:#}", source, e);
                self.rejected.push(RejectedDefinition {
                    source,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    /// Append another batch
    pub fn extend(&mut self, other: LoadedTargets) {
        self.targets.extend(other.targets);
        self.rejected.extend(other.rejected);
    }
}

/// Loads target definitions from a directory
pub struct TargetLoader {
    targets_dir: PathBuf,
}

impl TargetLoader {
    /// Create a new loader for a targets directory
    pub fn new(targets_dir: PathBuf) -> Self {
        Self { targets_dir }
    }

    /// Get the definition file path for a target name
    ///
    /// Names are sanitized the same way [`Target::file_stem`] is, so the
    /// path never leaves the targets directory.
    fn definition_path(&self, name: &str) -> PathBuf {
        let name = name.strip_suffix(".json").unwrap_or(name);
        self.targets_dir.join(format!("{}.json", sanitize_file_stem(name)))
    }

    /// Load a single definition by name
    pub async fn load(&self, name: &str) -> Result<Target> {
        let path = self.definition_path(name);
        Self::load_path(&path).await
    }

    /// Load a definition file
    pub async fn load_path(path: &Path) -> Result<Target> {
        debug!("Loading target definition: {}", path.display());
        let data = fs::read(path)
            .await
            .with_context(|| format!("Failed to read target definition {}", path.display()))?;
        let definition: TargetDefinition = serde_json::from_slice(&data)
            .with_context(|| format!("Invalid target definition {}", path.display()))?;
        let target = Target::try_from(definition)?;
        Ok(target)
    }

    /// Load several definitions by name, skipping the bad ones
    pub async fn load_many(&self, names: &[String]) -> LoadedTargets {
        let mut loaded = LoadedTargets::default();
        for name in names {
            loaded.record(name.clone(), self.load(name).await);
        }
        loaded
    }

    /// Load every definition in the directory, sorted by file name
    ///
    /// Only a failure to list the directory is an error. Bad files are
    /// logged and reported in [`LoadedTargets::rejected`].
    pub async fn load_all(&self) -> Result<LoadedTargets> {
        let mut paths = Vec::new();

        if !self.targets_dir.exists() {
            return Ok(LoadedTargets::default());
        }

        let mut entries = fs::read_dir(&self.targets_dir)
            .await
            .with_context(|| format!("Failed to list {}", self.targets_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = LoadedTargets::default();
        for path in paths {
            let result = Self::load_path(&path).await;
            loaded.record(path.display().to_string(), result);
        }
        info!(
            "Loaded {} target definitions from {} ({} rejected)",
            loaded.targets.len(),
            self.targets_dir.display(),
            loaded.rejected.len()
        );
        Ok(loaded)
    }

    /// Write a definition file for a target, returning its path
    pub async fn save(&self, target: &Target) -> Result<PathBuf> {
        let path = self.definition_path(&target.name);
        fs::create_dir_all(&self.targets_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.targets_dir.display()))?;
        let data = serde_json::to_vec_pretty(&TargetDefinition::from(target))?;
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved target definition: {}", path.display());
        Ok(path)
    }
}
