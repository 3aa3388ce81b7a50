//! Request-time orchestration.
//!
//! One engine value serves one request at a time: `begin` decides
//! between replaying a stored entry, capturing the application's output,
//! or staying out of the way; `finalize` re-checks eligibility once the
//! response status is known, runs the write-time transforms, and
//! persists.
//!
//! Concurrent requests each run their own engine against the shared
//! store. Two simultaneous misses for the same key both render and the
//! later `finalize` overwrites the earlier one — last writer wins, by
//! design; stampedes are not coalesced.
//!
//! Nothing on this path may abort the client response: storage trouble
//! on read degrades to a miss, on write to an uncached response.

use std::borrow::Cow;
use std::io::{self, Write};

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::config::CacheSettings;
use crate::context::{DeviceClass, RequestContext};
use crate::error::EngineError;
use crate::keys::CacheKey;
use crate::policy::{self, BypassReason, Cacheability};
use crate::storage::{BackendKind, Driver, StorageDriver};
use crate::transform;

/// Diagnostic response header naming the backend and device variant
/// that served a replay. Informational only.
pub const DIAGNOSTIC_HEADER: &str = "x-response-cache";

/// Receives response bytes from the engine. The caller decides how to
/// stream them to the client; any [`io::Write`] qualifies.
pub trait CaptureSink {
    fn deliver(&mut self, body: &[u8]) -> io::Result<()>;
}

impl<W: Write> CaptureSink for W {
    fn deliver(&mut self, body: &[u8]) -> io::Result<()> {
        self.write_all(body)
    }
}

/// Outcome of [`CacheEngine::begin`].
pub enum CacheDecision {
    /// A fresh entry answered the request; its body has already been
    /// delivered to the sink. The request is over — the application must
    /// not run.
    Serve(Served),
    /// No usable entry. Stream the application's output into the
    /// [`Capture`] and hand it back to [`CacheEngine::finalize`].
    Capture(Capture),
    /// Caching stays out of this request entirely.
    Bypass(BypassReason),
}

/// Replay summary for a cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub backend: BackendKind,
    pub device: DeviceClass,
}

impl Served {
    /// Header the integration layer may attach to the response.
    pub fn diagnostic_header(&self) -> (&'static str, String) {
        (DIAGNOSTIC_HEADER, format!("{}; {}", self.backend, self.device))
    }
}

/// Buffers the application's rendered output during a miss.
///
/// The application's writes land here instead of going to the client in
/// real time; `finalize` releases them.
pub struct Capture {
    key: CacheKey,
    buffer: Vec<u8>,
}

impl Capture {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            buffer: Vec::new(),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Outcome of [`CacheEngine::finalize`]. The buffered response reaches
/// the sink either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The entry was persisted and the replayed form delivered.
    Stored,
    /// Nothing was persisted; the buffer was delivered untransformed.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The request stopped being cacheable between begin and finalize.
    NotCacheable,
    /// The response status is not in `allowed_http_statuses`.
    StatusNotAllowed,
    /// An empty body is never persisted.
    EmptyBody,
    /// The write-time transform pipeline failed.
    TransformFailed,
    /// The storage write failed; the entry is simply not updated.
    StorageWrite,
}

/// Composes policy, key derivation, storage, and transforms for one
/// request at a time.
pub struct CacheEngine {
    settings: CacheSettings,
    driver: Driver,
}

impl CacheEngine {
    /// Resolves the configured storage backend once. An unusable
    /// selection fails here, before any request is served.
    pub fn new(settings: CacheSettings) -> Result<Self, EngineError> {
        let driver = Driver::from_settings(&settings)?;
        Ok(Self { settings, driver })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn backend(&self) -> BackendKind {
        self.driver.kind()
    }

    fn derive_key(&self, ctx: &RequestContext) -> CacheKey {
        CacheKey::derive(
            &ctx.host,
            &ctx.path_and_query(),
            ctx.device,
            &self.settings.excluded_query_params,
        )
    }

    /// Entry point at request start.
    ///
    /// On a hit the stored entry is decompressed, marker-substituted,
    /// and delivered to the sink; the caller must not run the
    /// application. On a miss the returned [`Capture`] buffers the
    /// application's output for [`Self::finalize`].
    #[instrument(skip_all, fields(host = %ctx.host, path = %ctx.path))]
    pub fn begin(&self, ctx: &RequestContext, sink: &mut dyn CaptureSink) -> CacheDecision {
        match policy::evaluate(ctx, &self.settings) {
            Cacheability::Eligible => {}
            Cacheability::Bypass(reason) => {
                debug!(outcome = "bypass", ?reason, "request not cacheable");
                return CacheDecision::Bypass(reason);
            }
        }

        // The one expensive rule, checked only once the cheap ones pass.
        if !self.driver.has_capacity(self.settings.disk_space_reserve_pct) {
            debug!(outcome = "bypass", reason = ?BypassReason::LowDiskSpace, "free space below reserve");
            return CacheDecision::Bypass(BypassReason::LowDiskSpace);
        }

        let key = self.derive_key(ctx);

        match self.driver.get(&key) {
            Ok(Some(content)) => match self.restore(content) {
                Some(body) => {
                    if let Err(error) = sink.deliver(&body) {
                        warn!(%error, "sink rejected replayed body");
                    }
                    debug!(outcome = "hit", backend = %self.driver.kind(), key = %key, "served from cache");
                    CacheDecision::Serve(Served {
                        backend: self.driver.kind(),
                        device: ctx.device,
                    })
                }
                None => {
                    debug!(outcome = "miss", key = %key, "stored entry undecodable, re-rendering");
                    CacheDecision::Capture(Capture::new(key))
                }
            },
            Ok(None) => {
                debug!(outcome = "miss", key = %key, "no fresh entry");
                CacheDecision::Capture(Capture::new(key))
            }
            Err(error) => {
                warn!(%error, key = %key, "storage read failed, rendering live");
                CacheDecision::Capture(Capture::new(key))
            }
        }
    }

    /// Entry point at request end.
    ///
    /// Policy is re-evaluated — conditions may have changed, and the
    /// status code is only known now. On success the freshly stored
    /// entry is replayed through the read path so the client sees
    /// exactly what later hits will see; on any failure the buffer is
    /// delivered as rendered and nothing is persisted.
    #[instrument(skip_all, fields(host = %ctx.host, path = %ctx.path, status))]
    pub fn finalize(
        &self,
        capture: Capture,
        ctx: &RequestContext,
        status: u16,
        content_type: Option<&str>,
        sink: &mut dyn CaptureSink,
    ) -> FinalizeOutcome {
        let Capture { key, buffer } = capture;

        if let Cacheability::Bypass(reason) = policy::evaluate(ctx, &self.settings) {
            debug!(?reason, "request no longer cacheable, releasing buffer");
            return self.release(&buffer, sink, SkipReason::NotCacheable);
        }
        if !self.settings.allowed_http_statuses.contains(&status) {
            debug!(status, "status not cacheable, releasing buffer");
            return self.release(&buffer, sink, SkipReason::StatusNotAllowed);
        }
        if buffer.is_empty() {
            debug!("empty body never persisted, releasing buffer");
            return self.release(&buffer, sink, SkipReason::EmptyBody);
        }

        let prepared = match self.prepare(&buffer, content_type) {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(%error, key = %key, "transform pipeline failed, response served uncached");
                return self.release(&buffer, sink, SkipReason::TransformFailed);
            }
        };

        if let Err(error) = self.driver.put(&key, &prepared, self.settings.ttl()) {
            warn!(%error, key = %key, "cache write failed, response served uncached");
            return self.release(&buffer, sink, SkipReason::StorageWrite);
        }
        debug!(key = %key, bytes = prepared.len(), "entry persisted");

        // Replay what was just stored so this response matches later hits.
        if let Ok(Some(content)) = self.driver.get(&key) {
            if let Some(body) = self.restore(content) {
                if let Err(error) = sink.deliver(&body) {
                    warn!(%error, "sink rejected replayed body");
                }
                return FinalizeOutcome::Stored;
            }
        }

        // Fresh write unreadable (e.g. zero TTL): fall back to the buffer.
        if let Err(error) = sink.deliver(&buffer) {
            warn!(%error, "sink rejected buffered body");
        }
        FinalizeOutcome::Stored
    }

    fn release(&self, buffer: &[u8], sink: &mut dyn CaptureSink, reason: SkipReason) -> FinalizeOutcome {
        if let Err(error) = sink.deliver(buffer) {
            warn!(%error, "sink rejected buffered body");
        }
        FinalizeOutcome::Skipped(reason)
    }

    /// Write-time pipeline: minify (content-type gated), then compress.
    fn prepare(&self, body: &[u8], content_type: Option<&str>) -> io::Result<Vec<u8>> {
        let minified: Cow<'_, [u8]> = if self.should_minify(content_type) {
            Cow::Owned(transform::minify(body))
        } else {
            Cow::Borrowed(body)
        };

        if self.settings.compress {
            transform::compress(&minified)
        } else {
            Ok(minified.into_owned())
        }
    }

    fn should_minify(&self, content_type: Option<&str>) -> bool {
        if !self.settings.minify {
            return false;
        }
        match content_type {
            Some(content_type) => {
                let essence = content_type.split(';').next().unwrap_or(content_type).trim();
                !self
                    .settings
                    .minify_excluded_content_types
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(essence))
            }
            None => true,
        }
    }

    /// Read-time pipeline: decompress, then substitute markers. `None`
    /// means the entry is unusable and should be treated as a miss.
    fn restore(&self, content: Bytes) -> Option<Vec<u8>> {
        let plain = if self.settings.compress {
            match transform::decompress(&content) {
                Ok(plain) => plain,
                Err(error) => {
                    warn!(%error, "stored entry failed to decompress");
                    return None;
                }
            }
        } else {
            content.to_vec()
        };

        Some(transform::substitute(&self.settings.replacements, plain))
    }
}
