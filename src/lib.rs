//! Full-page HTTP response cache engine.
//!
//! Sits in front of a web application: eligible requests are answered
//! from a cache store while a fresh entry exists; otherwise the rendered
//! output is captured, transformed, and persisted for future requests.
//!
//! - **Keys**: SHA-256 over host + canonicalized path/query, with a
//!   device-class suffix so mobile and desktop variants stay separate
//! - **Policy**: per-request cacheability rules (method, host allowance,
//!   session gating, URL exclusions, free-disk reserve)
//! - **Storage**: sharded filesystem tree or a Redis namespace, chosen
//!   once at construction
//! - **Transforms**: minification and gzip at write time, late-binding
//!   marker substitution on every replay
//!
//! ## Request cycle
//!
//! ```no_run
//! use std::io::Write;
//!
//! use crema::{CacheDecision, CacheEngine, CacheSettings, DeviceClass, RequestContext};
//! use http::Method;
//!
//! let engine = CacheEngine::new(CacheSettings::default())?;
//! let ctx = RequestContext::new(Method::GET, "www.example.com", "/news?page=2", DeviceClass::Desktop);
//!
//! let mut client = Vec::new();
//! match engine.begin(&ctx, &mut client) {
//!     // Replayed from the store; do not run the application.
//!     CacheDecision::Serve(served) => drop(served.diagnostic_header()),
//!     CacheDecision::Capture(mut capture) => {
//!         capture.write_all(b"<html>rendered</html>")?;
//!         engine.finalize(capture, &ctx, 200, Some("text/html"), &mut client);
//!     }
//!     CacheDecision::Bypass(_) => { /* render and stream normally */ }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! enabled = true
//! backend = "file"
//! cache_root = "storage/response-cache"
//! ttl_secs = 86400
//! allowed_hosts = ["www.production.com"]
//! excluded_url_substrings = ["/admin"]
//! minify = true
//!
//! [[replacements]]
//! marker = "%%CSRF%%"
//! file = "storage/csrf-token.txt"
//! ```

pub mod config;
pub mod context;
pub mod engine;
mod error;
pub mod keys;
pub mod manage;
pub mod policy;
pub mod storage;
pub mod transform;

pub use config::{CacheSettings, RedisSettings, SettingsError};
pub use context::{DeviceClass, DeviceClassifier, RequestContext, UserAgentClassifier};
pub use engine::{
    CacheDecision, CacheEngine, Capture, CaptureSink, DIAGNOSTIC_HEADER, FinalizeOutcome, Served,
    SkipReason,
};
pub use error::EngineError;
pub use keys::CacheKey;
pub use manage::ManagementFacade;
pub use policy::{BypassReason, Cacheability};
pub use storage::{BackendKind, Driver, FileDriver, RedisDriver, StorageDriver, StorageError};
pub use transform::{MarkerRule, Replacement};
