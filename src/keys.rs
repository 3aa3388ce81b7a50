//! Cache key derivation.
//!
//! A key is the SHA-256 of host + canonicalized path-and-query, hex
//! encoded, with the device class appended as a suffix outside the hash.
//! Keeping the device out of the hash lets storage shard on a
//! variant-agnostic prefix while desktop and mobile entries stay distinct
//! and independently invalidatable.

use std::fmt;

use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::context::DeviceClass;

/// Leading key characters used to bucket filesystem entries.
pub const SHARD_PREFIX_LEN: usize = 4;

/// Deterministic identifier for one cached response variant.
///
/// Identical logical requests (same host, same path after query-parameter
/// exclusion and reordering, same device class) always derive the same
/// key. Immutable once derived for a request's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: String,
    device: DeviceClass,
}

impl CacheKey {
    /// Derives the key for a logical request.
    ///
    /// Query parameters named in `excluded_params` are dropped before
    /// hashing; the remainder is reordered into a canonical form so that
    /// `/p?b=2&a=1` and `/p?a=1&b=2` map to the same key.
    pub fn derive(
        host: &str,
        path_and_query: &str,
        device: DeviceClass,
        excluded_params: &[String],
    ) -> Self {
        let canonical = canonicalize(path_and_query, excluded_params);

        let mut hasher = Sha256::new();
        hasher.update(host.as_bytes());
        hasher.update(canonical.as_bytes());

        Self {
            hash: hex::encode(hasher.finalize()),
            device,
        }
    }

    /// Leading hash characters that bucket this entry on disk.
    pub fn shard_prefix(&self) -> &str {
        &self.hash[..SHARD_PREFIX_LEN]
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.device)
    }
}

/// Normalizes `path?query` into its canonical form.
///
/// Excluded parameters are removed; the remaining pairs are stably sorted
/// by name, so duplicated names keep their original relative order.
fn canonicalize(path_and_query: &str, excluded_params: &[String]) -> String {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, query),
        None => (path_and_query, ""),
    };

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| !excluded_params.iter().any(|excluded| excluded == name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if pairs.is_empty() {
        return path.to_string();
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let encoded: String = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&pairs)
        .finish();

    format!("{path}?{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_EXCLUSIONS: &[String] = &[];

    fn derive(path_and_query: &str) -> CacheKey {
        CacheKey::derive("www.example.com", path_and_query, DeviceClass::Desktop, NO_EXCLUSIONS)
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive("/news?page=3"), derive("/news?page=3"));
    }

    #[test]
    fn query_order_does_not_fragment_keys() {
        assert_eq!(derive("/p?b=2&a=1"), derive("/p?a=1&b=2"));
    }

    #[test]
    fn excluded_parameter_collapses_to_bare_path() {
        let excluded = vec!["x".to_string()];
        let with_param = CacheKey::derive("h", "/p?x=1", DeviceClass::Desktop, &excluded);
        let without = CacheKey::derive("h", "/p", DeviceClass::Desktop, &excluded);
        assert_eq!(with_param, without);
    }

    #[test]
    fn kept_parameters_still_distinguish_keys() {
        let excluded = vec!["utm_source".to_string()];
        let page_one = CacheKey::derive("h", "/p?page=1&utm_source=mail", DeviceClass::Desktop, &excluded);
        let page_two = CacheKey::derive("h", "/p?page=2&utm_source=mail", DeviceClass::Desktop, &excluded);
        assert_ne!(page_one, page_two);
    }

    #[test]
    fn hosts_are_hashed_into_the_key() {
        let a = CacheKey::derive("a.example.com", "/p", DeviceClass::Desktop, NO_EXCLUSIONS);
        let b = CacheKey::derive("b.example.com", "/p", DeviceClass::Desktop, NO_EXCLUSIONS);
        assert_ne!(a, b);
    }

    #[test]
    fn device_class_is_a_visible_suffix() {
        let desktop = CacheKey::derive("h", "/p", DeviceClass::Desktop, NO_EXCLUSIONS);
        let mobile = CacheKey::derive("h", "/p", DeviceClass::Mobile, NO_EXCLUSIONS);

        assert_ne!(desktop, mobile);
        assert!(desktop.to_string().ends_with("-desktop"));
        assert!(mobile.to_string().ends_with("-mobile"));
        // Same hash, so both variants land in the same shard.
        assert_eq!(desktop.shard_prefix(), mobile.shard_prefix());
    }

    #[test]
    fn shard_prefix_is_four_hex_chars() {
        let key = derive("/p");
        assert_eq!(key.shard_prefix().len(), SHARD_PREFIX_LEN);
        assert!(key.shard_prefix().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_inputs_do_not_collide() {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for host in ["a.example.com", "b.example.com"] {
            for page in 0..500 {
                let key = CacheKey::derive(
                    host,
                    &format!("/catalog?page={page}"),
                    DeviceClass::Desktop,
                    NO_EXCLUSIONS,
                );
                assert!(seen.insert(key.to_string()), "collision for {host} page {page}");
            }
        }
    }
}
