//! Request snapshot types.
//!
//! The engine never reads ambient request state. The integration layer
//! builds a [`RequestContext`] from whatever its framework exposes and
//! hands it to every policy and key operation.

use std::fmt;

use http::Method;

/// Coarse classification of the requesting client.
///
/// Each class gets its own cache variant so a mobile rendering never
/// answers a desktop request. The class is embedded as a key suffix and
/// variants are independently invalidatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

impl DeviceClass {
    /// Every variant the cache stores for one logical path.
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Desktop, DeviceClass::Mobile];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a raw user-agent string to a [`DeviceClass`].
///
/// Real classification lives outside the engine; the engine only ever
/// sees the resulting class on the [`RequestContext`].
pub trait DeviceClassifier {
    fn classify(&self, user_agent: &str) -> DeviceClass;
}

/// Reference classifier: substring probes for common mobile tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentClassifier;

impl DeviceClassifier for UserAgentClassifier {
    fn classify(&self, user_agent: &str) -> DeviceClass {
        const MOBILE_TOKENS: [&str; 4] = ["Mobile", "Android", "iPhone", "iPad"];

        if MOBILE_TOKENS.iter().any(|token| user_agent.contains(token)) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Read-only snapshot of the inbound request.
///
/// Owned by the caller; the engine never mutates it. The two boolean
/// override signals are supplied by the integration layer, typically
/// from cookies: `cache_disabled` forces a bypass, `session_opted_in`
/// satisfies session-gated hosts and the optional global opt-in gate.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub host: String,
    /// Request path without the query string.
    pub path: String,
    /// Raw query string without the leading `?`, empty when absent.
    pub query: String,
    pub device: DeviceClass,
    pub cache_disabled: bool,
    pub session_opted_in: bool,
}

impl RequestContext {
    /// Builds a context from a combined `path?query` target.
    pub fn new(method: Method, host: impl Into<String>, path_and_query: &str, device: DeviceClass) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (path_and_query.to_string(), String::new()),
        };

        Self {
            method,
            host: host.into(),
            path,
            query,
            device,
            cache_disabled: false,
            session_opted_in: false,
        }
    }

    /// Marks the request as carrying the caller's "disable caching" signal.
    pub fn with_cache_disabled(mut self, disabled: bool) -> Self {
        self.cache_disabled = disabled;
        self
    }

    /// Marks the request as opted in to caching by its session.
    pub fn with_session_opt_in(mut self, opted_in: bool) -> Self {
        self.session_opted_in = opted_in;
        self
    }

    /// The combined target used for key derivation and URL exclusion checks.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}
