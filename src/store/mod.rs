//! Peer store
//!
//! One JSON [`PeerRecord`] per target under the data directory. Merges into
//! the same file are serialized by a per-file lock, and every write goes to a
//! temporary file that is renamed over the record only once it is complete.

pub mod record;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::HarvestError;
use crate::peer::PeerSet;
use crate::target::Target;

pub use record::PeerRecord;

/// Result of one merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub record: PeerRecord,
    /// Peers that were not stored before
    pub added: usize,
    pub path: PathBuf,
}

/// File-backed peer store
#[derive(Debug)]
pub struct PeerStore {
    data_dir: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PeerStore {
    /// Create a store rooted at `data_dir`; the directory is created lazily
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the record file for a target
    pub fn record_path(&self, target: &Target) -> PathBuf {
        self.data_dir.join(format!("{}.json", target.file_stem()))
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Load the stored record for a target, if any
    pub async fn load(&self, target: &Target) -> Result<Option<PeerRecord>, HarvestError> {
        let path = self.record_path(target);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HarvestError::persistence_error_full(
                    "Failed to read peer record",
                    path.display().to_string(),
                    e.to_string(),
                ))
            }
        };
        PeerRecord::deserialize(&data).map(Some).map_err(|e| {
            HarvestError::persistence_error_full(
                "Peer record is corrupt",
                path.display().to_string(),
                e.to_string(),
            )
        })
    }

    /// Read the record for a merge; a corrupt record is set aside and
    /// replaced by an empty one
    async fn read_for_merge(&self, path: &Path, target: &Target) -> Result<PeerRecord, HarvestError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No peer record yet at {}", path.display());
                return Ok(PeerRecord::new(&target.name));
            }
            Err(e) => {
                error!("Failed to read peer record '{}': {}", path.display(), e);
                return Err(HarvestError::persistence_error_full(
                    "Failed to read peer record",
                    path.display().to_string(),
                    e.to_string(),
                ));
            }
        };

        match PeerRecord::deserialize(&data) {
            Ok(record) => Ok(record),
            Err(e) => {
                let backup = sibling_with_suffix(path, ".corrupt");
                warn!(
                    "Peer record '{}' is corrupt ({}), moving it to '{}' and starting empty",
                    path.display(),
                    e,
                    backup.display()
                );
                fs::rename(path, &backup).await.map_err(|e| {
                    HarvestError::persistence_error_full(
                        "Failed to set aside corrupt peer record",
                        path.display().to_string(),
                        e.to_string(),
                    )
                })?;
                Ok(PeerRecord::new(&target.name))
            }
        }
    }

    /// Merge `peers` into the target's record and persist it atomically
    pub async fn merge_and_persist(
        &self,
        target: &Target,
        info_hashes: &[String],
        peers: &PeerSet,
    ) -> Result<MergeOutcome, HarvestError> {
        let path = self.record_path(target);
        let lock = self.lock_for(&path).await;
        let _guard = lock.lock().await;

        let mut record = self.read_for_merge(&path, target).await?;
        let added = record.merge(info_hashes, peers);

        let data = record.serialize().map_err(|e| {
            HarvestError::persistence_error_full(
                "Failed to serialize peer record",
                path.display().to_string(),
                e.to_string(),
            )
        })?;
        write_atomic(&path, &data).await?;

        info!(
            "{}: {} new peer(s), {} total -> {}",
            target.name,
            added,
            record.peers.len(),
            path.display()
        );
        Ok(MergeOutcome { record, added, path })
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write to `<path>.tmp`, sync, then rename over `path`
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|e| {
                HarvestError::persistence_error_full(
                    "Failed to create data directory",
                    parent.display().to_string(),
                    e.to_string(),
                )
            })?;
        }
    }

    let tmp = sibling_with_suffix(path, ".tmp");
    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        error!("Failed to write '{}': {}", tmp.display(), e);
        let _ = fs::remove_file(&tmp).await;
        return Err(HarvestError::persistence_error_full(
            "Failed to write peer record",
            tmp.display().to_string(),
            e.to_string(),
        ));
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        error!("Failed to replace '{}': {}", path.display(), e);
        let _ = fs::remove_file(&tmp).await;
        return Err(HarvestError::persistence_error_full(
            "Failed to replace peer record",
            path.display().to_string(),
            e.to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::peers;
    use tempfile::TempDir;

    fn set(addrs: &[&str]) -> PeerSet {
        peers(addrs).into_iter().collect()
    }

    fn hashes() -> Vec<String> {
        vec!["ABCDEF".to_string()]
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = PeerStore::new(dir.path());
        let target = Target::from_query("xubuntu14.04", "xubuntu 14.04");
        let found = set(&["1.2.3.4:51413", "5.6.7.8:6881"]);

        let first = store.merge_and_persist(&target, &hashes(), &found).await.unwrap();
        let second = store.merge_and_persist(&target, &hashes(), &found).await.unwrap();

        assert_eq!(first.added, 2);
        assert_eq!(second.added, 0);
        assert_eq!(first.record.peers, second.record.peers);
        assert_eq!(store.load(&target).await.unwrap().unwrap().peers, found);
    }

    #[tokio::test]
    async fn test_merge_is_monotonic_and_dedups() {
        let dir = TempDir::new().unwrap();
        let store = PeerStore::new(dir.path());
        let target = Target::from_hash("t", "ABCDEF");

        store
            .merge_and_persist(&target, &hashes(), &set(&["1.2.3.4:51413", "5.6.7.8:6881"]))
            .await
            .unwrap();
        let outcome = store
            .merge_and_persist(&target, &hashes(), &set(&["1.2.3.4:51413"]))
            .await
            .unwrap();
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.record.peers.len(), 2);

        let outcome = store.merge_and_persist(&target, &hashes(), &PeerSet::new()).await.unwrap();
        assert_eq!(outcome.record.peers.len(), 2);
    }

    #[tokio::test]
    async fn test_record_path_is_sanitized() {
        let store = PeerStore::new("data");
        let target = Target::from_query("../etc/passwd", "x");
        let path = store.record_path(&target);
        assert_eq!(path.parent(), Some(Path::new("data")));
        assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("{}.json", target.file_stem()));
    }

    #[tokio::test]
    async fn test_failed_temp_write_keeps_original() {
        let dir = TempDir::new().unwrap();
        let store = PeerStore::new(dir.path());
        let target = Target::from_query("t", "q");

        let first = store
            .merge_and_persist(&target, &hashes(), &set(&["1.2.3.4:51413"]))
            .await
            .unwrap();
        let original = std::fs::read(&first.path).unwrap();

        // A directory squatting on the temp path makes the write fail
        std::fs::create_dir(sibling_with_suffix(&first.path, ".tmp")).unwrap();

        let err = store
            .merge_and_persist(&target, &hashes(), &set(&["9.9.9.9:6881"]))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::PersistenceError { .. }));
        assert_eq!(std::fs::read(&first.path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let store = PeerStore::new(dir.path());
        let target = Target::from_query("t", "q");
        let path = store.record_path(&target);
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(store.load(&target).await.is_err());

        let outcome = store
            .merge_and_persist(&target, &hashes(), &set(&["1.2.3.4:51413"]))
            .await
            .unwrap();
        assert_eq!(outcome.record.peers.len(), 1);
        assert_eq!(
            std::fs::read(sibling_with_suffix(&path, ".corrupt")).unwrap(),
            b"{ not json".to_vec()
        );
    }

    #[tokio::test]
    async fn test_load_missing_record() {
        let dir = TempDir::new().unwrap();
        let store = PeerStore::new(dir.path().join("nested"));
        assert!(store.load(&Target::from_query("t", "q")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_merges_into_one_record() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(PeerStore::new(dir.path()));
        let target = Target::from_query("dup", "q");

        let mut handles = Vec::new();
        for i in 0..16u16 {
            let store = store.clone();
            let target = target.clone();
            handles.push(tokio::spawn(async move {
                let peer = format!("10.0.0.{}:{}", i + 1, 6881 + i);
                store
                    .merge_and_persist(&target, &[format!("{:040x}", i)], &set(&[peer.as_str()]))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.load(&target).await.unwrap().unwrap();
        assert_eq!(record.peers.len(), 16);
        assert_eq!(record.torrents.len(), 16);
    }
}
