//! Late-binding marker substitution.
//!
//! Applied on the read path only, after decompression. Cached content
//! keeps its placeholder markers on disk; each replay swaps them for the
//! current value — a CSRF token, a build stamp — so the fragment can
//! change without invalidating the entry.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use super::find_bytes;

/// One substitution rule, applied in configuration order.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerRule {
    /// Start marker. With `end_marker` set, the whole span from the start
    /// marker through the end marker is replaced; without it, each bare
    /// occurrence of the marker is replaced.
    pub marker: String,
    #[serde(default)]
    pub end_marker: Option<String>,
    #[serde(flatten)]
    pub replacement: Replacement,
}

/// Where the replacement text comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Replacement {
    /// Inline literal.
    Value(String),
    /// File read at substitution time. A missing or unreadable file
    /// strips the marker span instead of leaving markers in place.
    File(PathBuf),
}

/// Applies every rule, in order, to the replayed content.
pub fn substitute(rules: &[MarkerRule], content: Vec<u8>) -> Vec<u8> {
    rules.iter().fold(content, |acc, rule| apply_rule(rule, acc))
}

fn apply_rule(rule: &MarkerRule, content: Vec<u8>) -> Vec<u8> {
    let start = rule.marker.as_bytes();
    if start.is_empty() || find_bytes(&content, start, 0).is_none() {
        return content;
    }

    let replacement = resolve(rule);

    let mut out = Vec::with_capacity(content.len());
    let mut cursor = 0;

    while let Some(begin) = find_bytes(&content, start, cursor) {
        let span_end = match &rule.end_marker {
            Some(end_marker) => {
                match find_bytes(&content, end_marker.as_bytes(), begin + start.len()) {
                    Some(close) => close + end_marker.len(),
                    // Unterminated span: leave the rest untouched.
                    None => break,
                }
            }
            None => begin + start.len(),
        };

        out.extend_from_slice(&content[cursor..begin]);
        out.extend_from_slice(&replacement);
        cursor = span_end;
    }

    out.extend_from_slice(&content[cursor..]);
    out
}

fn resolve(rule: &MarkerRule) -> Vec<u8> {
    match &rule.replacement {
        Replacement::Value(value) => value.clone().into_bytes(),
        Replacement::File(path) => match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(
                    marker = %rule.marker,
                    path = %path.display(),
                    %error,
                    "replacement file unreadable, stripping marker"
                );
                Vec::new()
            }
        },
    }
}
