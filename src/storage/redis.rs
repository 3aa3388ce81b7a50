//! Redis cache store.
//!
//! Entries live flat in the store's namespace under `<hash>-<device>`;
//! expiry is delegated to the store via `SETEX` and refreshed on every
//! read hit, so an entry that keeps being served keeps living (sliding
//! expiry — a deliberate divergence from the filesystem backend's fixed
//! window).
//!
//! The connection is opened lazily on the first operation and reused
//! for the driver's lifetime; after a failed operation it is dropped and
//! reopened on the next one.

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use redis::{Client, Commands, Connection};
use time::OffsetDateTime;
use tracing::warn;

use super::{BackendKind, StorageDriver, StorageError};
use crate::config::RedisSettings;
use crate::error::EngineError;
use crate::keys::CacheKey;

pub struct RedisDriver {
    client: Client,
    conn: Mutex<Option<Connection>>,
    timeout: Duration,
    ttl: Duration,
}

impl RedisDriver {
    /// An unreachable target is only discovered on first use; an
    /// unparseable one is fatal here.
    pub fn new(settings: &RedisSettings, ttl: Duration) -> Result<Self, EngineError> {
        if settings.host.is_empty() {
            return Err(EngineError::configuration("redis.host must not be empty"));
        }

        // AUTH is attempted only when a credential is configured.
        let url = if settings.password.is_empty() {
            format!("redis://{}:{}/", settings.host, settings.port)
        } else {
            format!("redis://:{}@{}:{}/", settings.password, settings.host, settings.port)
        };

        let client = Client::open(url).map_err(|error| {
            EngineError::configuration(format!(
                "redis target {}:{} is unusable: {error}",
                settings.host, settings.port
            ))
        })?;

        Ok(Self {
            client,
            conn: Mutex::new(None),
            timeout: settings.timeout(),
            ttl,
        })
    }

    /// Runs one operation against the cached connection, reconnecting if
    /// none is held. The connection goes back into the slot only after a
    /// successful call; an errored connection is dropped so the next
    /// operation starts clean.
    fn with_conn<T>(
        &self,
        op: &'static str,
        run: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T, StorageError> {
        let mut slot = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(op, result = "poisoned_recovered", "recovered from poisoned connection lock");
                poisoned.into_inner()
            }
        };

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self
                .client
                .get_connection_with_timeout(self.timeout)
                .map_err(|source| StorageError::Backend { op, source })?,
        };

        match run(&mut conn) {
            Ok(value) => {
                *slot = Some(conn);
                Ok(value)
            }
            Err(source) => Err(StorageError::Backend { op, source }),
        }
    }
}

impl StorageDriver for RedisDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StorageError> {
        let name = key.to_string();
        let value: Option<Vec<u8>> = self.with_conn("get", |conn| conn.get(&name))?;

        match value {
            Some(content) => {
                // Sliding expiry: every hit restarts the window.
                let refresh = self.with_conn("expire", |conn| {
                    conn.expire::<_, i64>(&name, self.ttl.as_secs() as i64)
                });
                if let Err(error) = refresh {
                    warn!(key = %key, %error, "failed to refresh entry expiry");
                }
                Ok(Some(Bytes::from(content)))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, content: &[u8], ttl: Duration) -> Result<(), StorageError> {
        let name = key.to_string();
        self.with_conn("put", |conn| conn.set_ex::<_, _, ()>(&name, content, ttl.as_secs()))
    }

    fn delete(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let name = key.to_string();
        let removed: i64 = self.with_conn("delete", |conn| conn.del(&name))?;
        Ok(removed > 0)
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let name = key.to_string();
        self.with_conn("exists", |conn| conn.exists(&name))
    }

    /// Flushes the whole database. Destructive and namespace-wide: the
    /// database must be dedicated to this cache.
    fn clear_all(&self) -> Result<(), StorageError> {
        self.with_conn("clear_all", |conn| redis::cmd("FLUSHDB").exec(conn))
    }

    /// Redis does not expose entry creation time.
    fn created_at(&self, _key: &CacheKey) -> Result<Option<OffsetDateTime>, StorageError> {
        Err(StorageError::Unsupported { op: "created_at" })
    }

    /// Capacity is the store's own concern (maxmemory policy).
    fn has_capacity(&self, _reserve_pct: f64) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(host: &str, password: &str) -> RedisSettings {
        RedisSettings {
            host: host.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_host_is_a_construction_error() {
        assert!(RedisDriver::new(&settings("", ""), Duration::from_secs(60)).is_err());
    }

    #[test]
    fn construction_does_not_connect() {
        // Nothing listens on this port; construction must still succeed
        // because the connection is only opened on first use.
        let driver = RedisDriver::new(&settings("localhost", ""), Duration::from_secs(60));
        assert!(driver.is_ok());
    }

    #[test]
    fn unreachable_store_reports_backend_error() {
        let mut redis = settings("localhost", "");
        redis.port = 1; // reserved port, nothing listening
        redis.timeout_ms = 50;

        let driver = RedisDriver::new(&redis, Duration::from_secs(60)).expect("driver");
        let key = CacheKey::derive("h", "/p", crate::context::DeviceClass::Desktop, &[]);

        match driver.get(&key) {
            Err(StorageError::Backend { op, .. }) => assert_eq!(op, "get"),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn created_at_is_unsupported() {
        let driver = RedisDriver::new(&settings("localhost", ""), Duration::from_secs(60)).expect("driver");
        let key = CacheKey::derive("h", "/p", crate::context::DeviceClass::Desktop, &[]);
        assert!(matches!(
            driver.created_at(&key),
            Err(StorageError::Unsupported { op: "created_at" })
        ));
    }
}
