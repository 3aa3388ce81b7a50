//! Best-effort textual minification.
//!
//! A single-pass byte scanner, not an HTML parser: removes HTML
//! comments, collapses whitespace runs to a single space, and strips the
//! space touching a tag boundary. Operates on raw bytes — the ASCII
//! characters it inspects never occur inside multi-byte UTF-8 sequences,
//! so encoded text passes through unharmed. Binary content types must be
//! kept away by the caller's content-type gate.

use super::find_bytes;

const COMMENT_OPEN: &[u8] = b"<!--";
const COMMENT_CLOSE: &[u8] = b"-->";

/// Minifies markup-ish text. Idempotent: minifying already-minified
/// content is a no-op.
pub fn minify(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut i = 0;

    while i < content.len() {
        if content[i..].starts_with(COMMENT_OPEN) {
            match find_bytes(content, COMMENT_CLOSE, i + COMMENT_OPEN.len()) {
                Some(close) => {
                    i = close + COMMENT_CLOSE.len();
                    continue;
                }
                None => {
                    // Unterminated comment: emit the remainder untouched.
                    out.extend_from_slice(&content[i..]);
                    break;
                }
            }
        }

        if content[i].is_ascii_whitespace() {
            let mut end = i;
            while end < content.len() && content[end].is_ascii_whitespace() {
                end += 1;
            }

            let after_tag = out.last() == Some(&b'>');
            let before_tag = content.get(end) == Some(&b'<');
            if !after_tag && !before_tag {
                out.push(b' ');
            }

            i = end;
            continue;
        }

        out.push(content[i]);
        i += 1;
    }

    out
}
