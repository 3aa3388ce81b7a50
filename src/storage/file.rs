//! Filesystem cache store.
//!
//! One file per key under `<root>/<shard>/<key>`, where the shard is the
//! first four key characters — bounds directory fan-out without any
//! index. Freshness comes from the file's modification time; stale
//! entries stay on disk until the next write overwrites them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use sysinfo::Disks;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{BackendKind, StorageDriver, StorageError};
use crate::error::EngineError;
use crate::keys::CacheKey;

/// Marker file kept so empty cache directories survive version control.
const KEEP_MARKER: &str = ".gitignore";

pub struct FileDriver {
    root: PathBuf,
    ttl: Duration,
}

impl FileDriver {
    /// The cache root is created eagerly so a hopeless location fails at
    /// construction; shard directories are created lazily on first write.
    pub fn new(root: PathBuf, ttl: Duration) -> Result<Self, EngineError> {
        if root.as_os_str().is_empty() {
            return Err(EngineError::configuration("cache_root must not be empty"));
        }
        fs::create_dir_all(&root).map_err(|error| {
            EngineError::configuration(format!("cache_root {} is unusable: {error}", root.display()))
        })?;

        Ok(Self { root, ttl })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.shard_prefix()).join(key.to_string())
    }

    /// Strictly positive remaining lifetime; a zero TTL means every
    /// entry is already expired.
    fn is_fresh(&self, modified: SystemTime) -> bool {
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    /// Drops the shard directory when the last entry leaves it. A
    /// remaining keep-marker (or a concurrent writer) makes `remove_dir`
    /// fail, which is exactly the behavior we want.
    fn prune_shard(&self, shard: &Path) {
        let _ = fs::remove_dir(shard);
    }
}

impl StorageDriver for FileDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StorageError> {
        let path = self.entry_path(key);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { op: "get", source }),
        };

        let modified = metadata
            .modified()
            .map_err(|source| StorageError::Io { op: "get", source })?;
        if !self.is_fresh(modified) {
            // Stale entries are overwritten lazily by the next write.
            return Ok(None);
        }

        match fs::read(&path) {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { op: "get", source }),
        }
    }

    fn put(&self, key: &CacheKey, content: &[u8], _ttl: Duration) -> Result<(), StorageError> {
        let shard = self.root.join(key.shard_prefix());
        fs::create_dir_all(&shard).map_err(|source| StorageError::Io { op: "put", source })?;

        if let Err(source) = fs::write(self.entry_path(key), content) {
            // Leave no half-built shard directory behind.
            self.prune_shard(&shard);
            return Err(StorageError::Io { op: "put", source });
        }
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let path = self.entry_path(key);

        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(shard) = path.parent() {
                    self.prune_shard(shard);
                }
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io { op: "delete", source }),
        }
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StorageError> {
        Ok(self.entry_path(key).is_file())
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let shards = fs::read_dir(&self.root).map_err(|source| StorageError::Io {
            op: "clear_all",
            source,
        })?;

        for shard in shards {
            let shard = shard.map_err(|source| StorageError::Io {
                op: "clear_all",
                source,
            })?;
            if !shard.path().is_dir() {
                continue;
            }

            let entries = fs::read_dir(shard.path()).map_err(|source| StorageError::Io {
                op: "clear_all",
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| StorageError::Io {
                    op: "clear_all",
                    source,
                })?;
                if entry.file_name() == KEEP_MARKER || !entry.path().is_file() {
                    continue;
                }
                fs::remove_file(entry.path()).map_err(|source| StorageError::Io {
                    op: "clear_all",
                    source,
                })?;
            }

            self.prune_shard(&shard.path());
        }

        Ok(())
    }

    fn created_at(&self, key: &CacheKey) -> Result<Option<OffsetDateTime>, StorageError> {
        match fs::metadata(self.entry_path(key)) {
            Ok(metadata) => {
                let modified = metadata
                    .modified()
                    .map_err(|source| StorageError::Io { op: "created_at", source })?;
                Ok(Some(OffsetDateTime::from(modified)))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { op: "created_at", source }),
        }
    }

    fn has_capacity(&self, reserve_pct: f64) -> bool {
        match free_space_pct(&self.root) {
            Some(free_pct) => {
                if free_pct > reserve_pct {
                    true
                } else {
                    warn!(
                        free_pct,
                        reserve_pct,
                        root = %self.root.display(),
                        "free disk space below cache reserve, writes suspended"
                    );
                    false
                }
            }
            None => {
                debug!(root = %self.root.display(), "no disk stats for cache root, assuming capacity");
                true
            }
        }
    }
}

/// Free-space percentage of the disk holding `root`, picked by the
/// longest matching mount point.
fn free_space_pct(root: &Path) -> Option<f64> {
    let resolved = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    let disk = disks
        .list()
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())?;

    if disk.total_space() == 0 {
        return None;
    }
    Some(disk.available_space() as f64 / disk.total_space() as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DeviceClass;

    const DAY: Duration = Duration::from_secs(60 * 60 * 24);

    fn key(path: &str) -> CacheKey {
        CacheKey::derive("www.example.com", path, DeviceClass::Desktop, &[])
    }

    fn driver(root: &Path, ttl: Duration) -> FileDriver {
        FileDriver::new(root.to_path_buf(), ttl).expect("driver")
    }

    #[test]
    fn round_trips_immediately_after_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/page");

        driver.put(&key, b"<html>hi</html>", DAY).expect("put");
        let cached = driver.get(&key).expect("get").expect("fresh entry");
        assert_eq!(cached.as_ref(), b"<html>hi</html>");
    }

    #[test]
    fn entries_land_in_shard_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/page");

        driver.put(&key, b"x", DAY).expect("put");

        let expected = dir.path().join(key.shard_prefix()).join(key.to_string());
        assert!(expected.is_file());
    }

    #[test]
    fn zero_ttl_entries_are_expired_on_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), Duration::ZERO);
        let key = key("/page");

        driver.put(&key, b"x", Duration::ZERO).expect("put");
        assert!(driver.get(&key).expect("get").is_none());
        // The stale file stays on disk for a later write to overwrite.
        assert!(driver.exists(&key).expect("exists"));
    }

    #[test]
    fn missing_entry_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        assert!(driver.get(&key("/missing")).expect("get").is_none());
    }

    #[test]
    fn overwrite_replaces_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/page");

        driver.put(&key, b"first", DAY).expect("put");
        driver.put(&key, b"second", DAY).expect("put");
        assert_eq!(driver.get(&key).expect("get").expect("entry").as_ref(), b"second");
    }

    #[test]
    fn delete_reports_and_prunes_empty_shard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/page");

        driver.put(&key, b"x", DAY).expect("put");
        let shard = dir.path().join(key.shard_prefix());
        assert!(shard.is_dir());

        assert!(driver.delete(&key).expect("delete"));
        assert!(!shard.exists());
        assert!(!driver.delete(&key).expect("second delete"));
    }

    #[test]
    fn delete_keeps_shard_with_other_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/page");

        driver.put(&key, b"x", DAY).expect("put");
        let shard = dir.path().join(key.shard_prefix());
        fs::write(shard.join("sibling"), b"y").expect("sibling");

        assert!(driver.delete(&key).expect("delete"));
        assert!(shard.is_dir());
    }

    #[test]
    fn clear_all_empties_shards_but_keeps_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let first = key("/a");
        let second = key("/b");

        driver.put(&first, b"a", DAY).expect("put");
        driver.put(&second, b"b", DAY).expect("put");
        fs::write(dir.path().join(KEEP_MARKER), b"*\n").expect("marker");

        driver.clear_all().expect("clear_all");

        assert!(driver.get(&first).expect("get").is_none());
        assert!(driver.get(&second).expect("get").is_none());
        assert!(dir.path().join(KEEP_MARKER).is_file());
        assert!(!dir.path().join(first.shard_prefix()).exists());
    }

    #[test]
    fn clear_all_spares_marker_inside_shard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/a");

        driver.put(&key, b"a", DAY).expect("put");
        let shard = dir.path().join(key.shard_prefix());
        fs::write(shard.join(KEEP_MARKER), b"*\n").expect("marker");

        driver.clear_all().expect("clear_all");

        assert!(driver.get(&key).expect("get").is_none());
        // Shard survives because the marker keeps it non-empty.
        assert!(shard.join(KEEP_MARKER).is_file());
    }

    #[test]
    fn created_at_reflects_the_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = driver(dir.path(), DAY);
        let key = key("/page");

        assert!(driver.created_at(&key).expect("created_at").is_none());

        let before = OffsetDateTime::now_utc() - time::Duration::seconds(5);
        driver.put(&key, b"x", DAY).expect("put");
        let created = driver.created_at(&key).expect("created_at").expect("timestamp");
        assert!(created > before);
    }

    #[test]
    fn empty_root_is_a_construction_error() {
        assert!(FileDriver::new(PathBuf::new(), DAY).is_err());
    }
}
