//! Content transforms around the storage boundary.
//!
//! Write path: minify, then compress. Read path: decompress, then marker
//! substitution. Substitution is never persisted — stored entries keep
//! their markers so dynamic fragments can change without invalidating
//! the entry.

mod compress;
mod markers;
mod minify;

pub use compress::{compress, decompress};
pub use markers::{MarkerRule, Replacement, substitute};
pub use minify::minify;

/// First occurrence of `needle` in `haystack` at or after `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_bytes_respects_offset() {
        let haystack = b"abcabc";
        assert_eq!(find_bytes(haystack, b"abc", 0), Some(0));
        assert_eq!(find_bytes(haystack, b"abc", 1), Some(3));
        assert_eq!(find_bytes(haystack, b"abc", 4), None);
    }

    #[test]
    fn find_bytes_handles_degenerate_needles() {
        assert_eq!(find_bytes(b"abc", b"", 0), None);
        assert_eq!(find_bytes(b"abc", b"abcd", 0), None);
        assert_eq!(find_bytes(b"", b"a", 0), None);
    }
}
