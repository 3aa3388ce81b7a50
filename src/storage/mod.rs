//! Pluggable cache storage.
//!
//! Two backends behind one contract: a sharded on-disk tree with fixed
//! expiry checked at read time, and a Redis namespace with store-managed
//! sliding expiry. The backend is a closed choice resolved once at
//! engine construction, never per call.
//!
//! Nothing here panics across the trait boundary: every operation
//! reports failure through [`StorageError`] and the orchestrator decides
//! what to do with it.

mod file;
mod redis;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::config::CacheSettings;
use crate::error::EngineError;
use crate::keys::CacheKey;

pub use self::file::FileDriver;
pub use self::redis::RedisDriver;

/// Which backend a driver writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::File => "file",
            BackendKind::Redis => "redis",
        })
    }
}

/// Recoverable storage failures.
///
/// The read path treats these as a cache miss; the write path logs and
/// skips persistence. Neither ever aborts the client response.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cache storage I/O failed during {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("cache backend unavailable during {op}: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: ::redis::RedisError,
    },
    #[error("`{op}` is not supported by this backend")]
    Unsupported { op: &'static str },
}

/// Common contract over both cache stores.
pub trait StorageDriver {
    fn kind(&self) -> BackendKind;

    /// Returns content only when present and fresh under this backend's
    /// expiry rule. The Redis backend refreshes the entry's TTL on every
    /// hit (sliding expiry); the filesystem backend has no read side
    /// effects.
    fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StorageError>;

    /// Writes or overwrites an entry. Whichever concurrent writer
    /// finishes last wins; there is no coordination between writers.
    fn put(&self, key: &CacheKey, content: &[u8], ttl: Duration) -> Result<(), StorageError>;

    /// Removes an entry if present; reports whether a deletion occurred.
    fn delete(&self, key: &CacheKey) -> Result<bool, StorageError>;

    /// Presence probe without freshness or expiry side effects.
    fn exists(&self, key: &CacheKey) -> Result<bool, StorageError>;

    /// Removes every entry under this driver's namespace.
    fn clear_all(&self) -> Result<(), StorageError>;

    /// Best effort; the Redis backend reports [`StorageError::Unsupported`].
    fn created_at(&self, key: &CacheKey) -> Result<Option<OffsetDateTime>, StorageError>;

    /// Whether free storage stays above the configured reserve after a
    /// write. Always true for backends with their own capacity
    /// management.
    fn has_capacity(&self, reserve_pct: f64) -> bool;
}

/// The closed set of storage backends.
pub enum Driver {
    File(FileDriver),
    Redis(RedisDriver),
}

impl Driver {
    /// Resolves the configured backend. An unusable selection is fatal
    /// here, before any request is served.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, EngineError> {
        match settings.backend {
            BackendKind::File => Ok(Driver::File(FileDriver::new(
                settings.cache_root.clone(),
                settings.ttl(),
            )?)),
            BackendKind::Redis => Ok(Driver::Redis(RedisDriver::new(&settings.redis, settings.ttl())?)),
        }
    }
}

impl StorageDriver for Driver {
    fn kind(&self) -> BackendKind {
        match self {
            Driver::File(driver) => driver.kind(),
            Driver::Redis(driver) => driver.kind(),
        }
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StorageError> {
        match self {
            Driver::File(driver) => driver.get(key),
            Driver::Redis(driver) => driver.get(key),
        }
    }

    fn put(&self, key: &CacheKey, content: &[u8], ttl: Duration) -> Result<(), StorageError> {
        match self {
            Driver::File(driver) => driver.put(key, content, ttl),
            Driver::Redis(driver) => driver.put(key, content, ttl),
        }
    }

    fn delete(&self, key: &CacheKey) -> Result<bool, StorageError> {
        match self {
            Driver::File(driver) => driver.delete(key),
            Driver::Redis(driver) => driver.delete(key),
        }
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StorageError> {
        match self {
            Driver::File(driver) => driver.exists(key),
            Driver::Redis(driver) => driver.exists(key),
        }
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        match self {
            Driver::File(driver) => driver.clear_all(),
            Driver::Redis(driver) => driver.clear_all(),
        }
    }

    fn created_at(&self, key: &CacheKey) -> Result<Option<OffsetDateTime>, StorageError> {
        match self {
            Driver::File(driver) => driver.created_at(key),
            Driver::Redis(driver) => driver.created_at(key),
        }
    }

    fn has_capacity(&self, reserve_pct: f64) -> bool {
        match self {
            Driver::File(driver) => driver.has_capacity(reserve_pct),
            Driver::Redis(driver) => driver.has_capacity(reserve_pct),
        }
    }
}
