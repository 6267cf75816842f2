//! Evidence provenance helpers
//!
//! Episodes are content-addressed at append time. The hash survives pruning,
//! so a belief citing a long-gone episode can still show where its evidence
//! came from.

use sha2::{Digest, Sha256};

/// Return the SHA-256 hex digest of a text payload.
pub fn sha256_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Build a stable evidence reference id from source coordinates.
///
/// The reference is the first 24 hex chars of
/// `sha256("{source_type}:{source_path}:{content_hash}")`, short enough to
/// embed in logs while keeping collisions implausible.
pub fn evidence_ref(source_type: &str, source_path: &str, content_hash: &str) -> String {
    let raw = format!("{source_type}:{source_path}:{content_hash}");
    let mut digest = sha256_text(&raw);
    digest.truncate(24);
    digest
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_text_known_vector() {
        // sha256("abc")
        assert_eq!(
            sha256_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_text_stable() {
        assert_eq!(sha256_text("episode payload"), sha256_text("episode payload"));
        assert_ne!(sha256_text("a"), sha256_text("b"));
    }

    #[test]
    fn test_evidence_ref_shape() {
        let r = evidence_ref("episode", "42", "deadbeef");
        assert_eq!(r.len(), 24);
        assert!(r.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_evidence_ref_distinguishes_sources() {
        let a = evidence_ref("episode", "42", "deadbeef");
        let b = evidence_ref("file", "42", "deadbeef");
        assert_ne!(a, b);
    }
}
