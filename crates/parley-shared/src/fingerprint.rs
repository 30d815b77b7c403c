//! Content fingerprinting for change detection and render-cache keying.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Compute the fingerprint of a message's content renderings.
///
/// SHA-256 over the UTF-8 bytes of `markdown + "|" + plain_text + "|" + html`,
/// base64-encoded.  Absent renderings contribute an empty string, so the
/// function is total and deterministic.
pub fn content_fingerprint(markdown: &str, plain_text: &str, html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(markdown.as_bytes());
    hasher.update(b"|");
    hasher.update(plain_text.as_bytes());
    hasher.update(b"|");
    hasher.update(html.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_identical_content() {
        let a = content_fingerprint("**hi**", "hi", "<strong>hi</strong>");
        let b = content_fingerprint("**hi**", "hi", "<strong>hi</strong>");
        assert_eq!(a, b);
    }

    #[test]
    fn changing_any_rendering_changes_the_fingerprint() {
        let base = content_fingerprint("a", "b", "c");
        assert_ne!(base, content_fingerprint("x", "b", "c"));
        assert_ne!(base, content_fingerprint("a", "x", "c"));
        assert_ne!(base, content_fingerprint("a", "b", "x"));
    }

    #[test]
    fn field_boundaries_are_not_ambiguous() {
        // Moving a character across the separator must not collide.
        assert_ne!(
            content_fingerprint("ab", "c", ""),
            content_fingerprint("a", "bc", "")
        );
    }

    #[test]
    fn empty_content_is_valid() {
        let fp = content_fingerprint("", "", "");
        assert!(!fp.is_empty());
    }
}
