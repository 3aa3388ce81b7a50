//! Cacheability rules.
//!
//! Every rule is an independent AND-condition; the first failing rule
//! names the bypass reason. The rules here are pure over the request
//! snapshot and settings — the free-disk-space check, which costs a
//! system probe, is applied by the engine only after these pass.

use http::Method;

use crate::config::CacheSettings;
use crate::context::RequestContext;

/// Why a request was ruled out of caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// Caching is switched off in the settings.
    Disabled,
    /// The caller supplied the "disable caching" override signal.
    DisabledByClient,
    /// The global opt-in gate is configured and the session has not opted in.
    OptInMissing,
    /// Only GET responses are cached.
    MethodNotGet,
    /// The host matches none of the configured allowed hosts.
    HostNotAllowed,
    /// The host is session-gated and the session has not opted in.
    SessionNotOptedIn,
    /// The request target contains an excluded substring.
    ExcludedUrl,
    /// Free storage fell below the configured reserve.
    LowDiskSpace,
}

/// Outcome of the pure cacheability rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    Eligible,
    Bypass(BypassReason),
}

impl Cacheability {
    pub fn is_eligible(self) -> bool {
        matches!(self, Cacheability::Eligible)
    }
}

/// Evaluates whether caching may be consulted or written for a request.
///
/// Rule order only matters for which reason gets reported; cheap checks
/// run first. Host allowance and session gating are independent gates —
/// a session-gated host must also pass the allowed-hosts rule.
pub fn evaluate(ctx: &RequestContext, settings: &CacheSettings) -> Cacheability {
    if ctx.method != Method::GET {
        return Cacheability::Bypass(BypassReason::MethodNotGet);
    }

    if !settings.enabled {
        return Cacheability::Bypass(BypassReason::Disabled);
    }

    if ctx.cache_disabled {
        return Cacheability::Bypass(BypassReason::DisabledByClient);
    }

    if settings.opt_in_gated && !ctx.session_opted_in {
        return Cacheability::Bypass(BypassReason::OptInMissing);
    }

    if !host_allowed(&ctx.host, &settings.allowed_hosts) {
        return Cacheability::Bypass(BypassReason::HostNotAllowed);
    }

    if host_matches(&ctx.host, &settings.session_gated_hosts) && !ctx.session_opted_in {
        return Cacheability::Bypass(BypassReason::SessionNotOptedIn);
    }

    let target = ctx.path_and_query();
    if settings
        .excluded_url_substrings
        .iter()
        .any(|fragment| target.contains(fragment.as_str()))
    {
        return Cacheability::Bypass(BypassReason::ExcludedUrl);
    }

    Cacheability::Eligible
}

/// An empty allowed-hosts list means every host may be cached.
fn host_allowed(host: &str, allowed_hosts: &[String]) -> bool {
    allowed_hosts.is_empty() || host_matches(host, allowed_hosts)
}

/// Substring containment match against any configured host.
fn host_matches(host: &str, configured: &[String]) -> bool {
    configured.iter().any(|entry| host.contains(entry.as_str()))
}
