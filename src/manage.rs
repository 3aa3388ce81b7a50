//! Invalidation and inspection operations for external callers.
//!
//! Management commands live outside the request path — a console
//! command, an admin endpoint, a deploy hook. They only need key
//! derivation plus the storage operations, so this facade owns its own
//! driver and never touches policy or transforms.
//!
//! Failures here are reported as "nothing happened" and logged; a
//! management command must not crash because the store is briefly away.

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::context::DeviceClass;
use crate::error::EngineError;
use crate::keys::CacheKey;
use crate::storage::{Driver, StorageDriver};

pub struct ManagementFacade {
    settings: CacheSettings,
    driver: Driver,
}

impl ManagementFacade {
    pub fn new(settings: CacheSettings) -> Result<Self, EngineError> {
        let driver = Driver::from_settings(&settings)?;
        Ok(Self { settings, driver })
    }

    fn derive_key(&self, host: &str, path_and_query: &str, device: DeviceClass) -> CacheKey {
        CacheKey::derive(host, path_and_query, device, &self.settings.excluded_query_params)
    }

    /// Removes every device variant cached for one logical path.
    /// Returns whether any deletion occurred.
    pub fn invalidate(&self, host: &str, path_and_query: &str) -> bool {
        let mut removed = false;

        for device in DeviceClass::ALL {
            let key = self.derive_key(host, path_and_query, device);
            match self.driver.delete(&key) {
                Ok(true) => {
                    debug!(key = %key, "cache entry invalidated");
                    removed = true;
                }
                Ok(false) => {}
                Err(error) => warn!(%error, key = %key, "cache invalidation failed"),
            }
        }

        removed
    }

    /// Whether an entry is present for the path and device variant,
    /// regardless of freshness.
    pub fn exists(&self, host: &str, path_and_query: &str, device: DeviceClass) -> bool {
        let key = self.derive_key(host, path_and_query, device);
        match self.driver.exists(&key) {
            Ok(present) => present,
            Err(error) => {
                warn!(%error, key = %key, "cache existence check failed");
                false
            }
        }
    }

    /// Best effort: the Redis backend cannot report creation time.
    pub fn created_at(&self, host: &str, path_and_query: &str, device: DeviceClass) -> Option<OffsetDateTime> {
        let key = self.derive_key(host, path_and_query, device);
        match self.driver.created_at(&key) {
            Ok(timestamp) => timestamp,
            Err(crate::storage::StorageError::Unsupported { op }) => {
                debug!(op, backend = %self.driver.kind(), "not supported by this backend");
                None
            }
            Err(error) => {
                warn!(%error, key = %key, "cache timestamp lookup failed");
                None
            }
        }
    }

    /// Empties the driver's whole namespace. For the Redis backend this
    /// flushes the entire database.
    pub fn clear_all(&self) -> bool {
        match self.driver.clear_all() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "cache clear failed");
                false
            }
        }
    }
}
