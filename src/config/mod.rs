//! Engine configuration: typed settings with layered precedence (file → env).
//!
//! The host application usually builds [`CacheSettings`] from its own
//! configuration system; [`CacheSettings::load`] is a convenience for
//! hosts that want a standalone TOML file with environment overrides
//! (prefix `CREMA`, `__` as the section separator).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::storage::BackendKind;
use crate::transform::MarkerRule;

const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24;
const DEFAULT_CACHE_ROOT: &str = "storage/response-cache";
const DEFAULT_DISK_SPACE_RESERVE_PCT: f64 = 5.0;
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_REDIS_TIMEOUT_MS: u64 = 500;
const ENV_PREFIX: &str = "CREMA";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cache settings could not be loaded: {0}")]
    Load(#[from] config::ConfigError),
}

/// All recognized cache options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Master switch; `false` bypasses every request.
    pub enabled: bool,
    /// Entry lifetime in seconds. One day by default.
    pub ttl_secs: u64,
    pub backend: BackendKind,
    /// Root of the on-disk cache tree (file backend only).
    pub cache_root: PathBuf,
    /// Hosts eligible for caching, matched by substring containment.
    /// Empty means every host.
    pub allowed_hosts: Vec<String>,
    /// Hosts cached only for sessions that supplied the opt-in signal.
    pub session_gated_hosts: Vec<String>,
    /// When set, no request is cached unless its session opted in.
    pub opt_in_gated: bool,
    /// Response statuses that may be persisted.
    pub allowed_http_statuses: Vec<u16>,
    /// Requests whose target contains any of these are never cached.
    pub excluded_url_substrings: Vec<String>,
    /// Query parameters dropped before key derivation.
    pub excluded_query_params: Vec<String>,
    pub minify: bool,
    /// Content types exempt from minification, case-insensitive.
    pub minify_excluded_content_types: Vec<String>,
    pub compress: bool,
    /// Marker substitution rules, applied in order on every replay.
    pub replacements: Vec<MarkerRule>,
    /// Minimum free-disk percentage kept clear of cache writes.
    pub disk_space_reserve_pct: f64,
    pub redis: RedisSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_TTL_SECS,
            backend: BackendKind::File,
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            allowed_hosts: Vec::new(),
            session_gated_hosts: Vec::new(),
            opt_in_gated: false,
            allowed_http_statuses: vec![200],
            excluded_url_substrings: Vec::new(),
            excluded_query_params: Vec::new(),
            minify: false,
            minify_excluded_content_types: vec![
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/jpg".to_string(),
                "image/jpeg".to_string(),
            ],
            compress: false,
            replacements: Vec::new(),
            disk_space_reserve_pct: DEFAULT_DISK_SPACE_RESERVE_PCT,
            redis: RedisSettings::default(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Loads settings from an optional TOML file with `CREMA_*`
    /// environment overrides layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Connection settings for the Redis backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    /// Leave empty when the store requires no AUTH.
    pub password: String,
    pub timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            password: String::new(),
            timeout_ms: DEFAULT_REDIS_TIMEOUT_MS,
        }
    }
}

impl RedisSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
