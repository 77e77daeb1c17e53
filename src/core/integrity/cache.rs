use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::debug;

use super::algorithm::IntegrityAlgorithm;
use crate::core::config::CoreConfig;
use crate::core::error::{CoreError, CoreResult};

/// A computed digest together with the modification time it was taken at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCacheEntry {
    pub checksum: String,
    pub modified: SystemTime,
}

/// Digest memo keyed by `(path, algorithm)`.
///
/// An entry is trusted for as long as the file's modification time is
/// unchanged. Content rewritten with an identical mtime is not detected.
pub struct ChecksumCache {
    config: Arc<CoreConfig>,
    entries: RwLock<HashMap<(PathBuf, IntegrityAlgorithm), HashCacheEntry>>,
}

impl ChecksumCache {
    pub fn new(config: Arc<CoreConfig>) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Digest of `path`, or `None` when checksum verification is disabled.
    pub async fn get_checksum(
        &self,
        path: &Path,
        algorithm: IntegrityAlgorithm,
    ) -> CoreResult<Option<String>> {
        if !self.config.verify_checksums {
            return Ok(None);
        }

        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| CoreError::io(path, e))?;
        let key = (path.to_path_buf(), algorithm);

        if self.config.cache_checksums {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if entry.modified == modified {
                    return Ok(Some(entry.checksum.clone()));
                }
            }
        }

        let checksum = algorithm.digest_file(path).await?;
        debug!("Computed {} for {:?}: {}", algorithm, path, checksum);

        if self.config.cache_checksums {
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    key,
                    HashCacheEntry {
                        checksum: checksum.clone(),
                        modified,
                    },
                );
        }
        Ok(Some(checksum))
    }

    /// Drop every algorithm's entry for `path`.
    pub fn invalidate(&self, path: &Path) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(cached, _), _| cached != path);
    }

    pub fn entry(&self, path: &Path, algorithm: IntegrityAlgorithm) -> Option<HashCacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(path.to_path_buf(), algorithm))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache(edit: impl FnOnce(&mut CoreConfig) + Send + 'static) -> ChecksumCache {
        ChecksumCache::new(CoreConfig::builder().edit(edit).build())
    }

    fn set_mtime(path: &Path, modified: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[tokio::test]
    async fn stale_digest_survives_rewrite_with_same_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"hello\n").unwrap();
        let cache = cache(|_| {});

        let first = cache
            .get_checksum(&path, IntegrityAlgorithm::Sha1)
            .await
            .unwrap()
            .unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        std::fs::write(&path, b"changed content\n").unwrap();
        set_mtime(&path, modified);

        let cached = cache
            .get_checksum(&path, IntegrityAlgorithm::Sha1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached, first, "mtime unchanged, cached digest is returned");

        cache.invalidate(&path);
        let fresh = cache
            .get_checksum(&path, IntegrityAlgorithm::Sha1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh, IntegrityAlgorithm::Sha1.digest_bytes(b"changed content\n"));
    }

    #[tokio::test]
    async fn changed_mtime_forces_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"one").unwrap();
        let cache = cache(|_| {});

        cache.get_checksum(&path, IntegrityAlgorithm::Md5).await.unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        std::fs::write(&path, b"two").unwrap();
        set_mtime(&path, modified + Duration::from_secs(10));

        let digest = cache
            .get_checksum(&path, IntegrityAlgorithm::Md5)
            .await
            .unwrap();
        assert_eq!(digest, Some(IntegrityAlgorithm::Md5.digest_bytes(b"two")));
        assert_eq!(
            cache.entry(&path, IntegrityAlgorithm::Md5).unwrap().modified,
            modified + Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn invalidate_evicts_all_algorithms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        let other = dir.path().join("other.txt");
        std::fs::write(&path, b"x").unwrap();
        std::fs::write(&other, b"y").unwrap();
        let cache = cache(|_| {});

        cache.get_checksum(&path, IntegrityAlgorithm::Sha1).await.unwrap();
        cache.get_checksum(&path, IntegrityAlgorithm::Sha256).await.unwrap();
        cache.get_checksum(&other, IntegrityAlgorithm::Sha1).await.unwrap();
        assert_eq!(cache.len(), 3);

        cache.invalidate(&path);
        assert_eq!(cache.len(), 1);
        assert!(cache.entry(&other, IntegrityAlgorithm::Sha1).is_some());
    }

    #[tokio::test]
    async fn disabled_verification_and_caching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"x").unwrap();

        let unverified = cache(|c| c.verify_checksums = false);
        assert_eq!(
            unverified
                .get_checksum(&path, IntegrityAlgorithm::Sha1)
                .await
                .unwrap(),
            None
        );

        let uncached = cache(|c| c.cache_checksums = false);
        assert!(uncached
            .get_checksum(&path, IntegrityAlgorithm::Sha1)
            .await
            .unwrap()
            .is_some());
        assert!(uncached.is_empty());
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        match cache(|_| {}).get_checksum(&path, IntegrityAlgorithm::Sha1).await {
            Err(CoreError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
