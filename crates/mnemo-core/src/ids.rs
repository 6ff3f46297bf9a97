//! Identity and hashing helpers.
//!
//! Document identity is derived, not random: the content hash is the md5 of
//! the body after front-matter, and the document id is the first 12 hex
//! characters of `sha256("{content_hash}|{path}")`. Both strings are part of
//! the on-disk contract.

use md5::{Digest as Md5Digest, Md5};
use sha2::Sha256;

/// Length of a document id in hex characters.
pub const DOC_ID_LEN: usize = 12;

/// Compute the content hash for a document body (lowercase hex md5).
pub fn content_hash(body: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a stable document id from a content hash and a relative path.
pub fn doc_id(content_hash: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..DOC_ID_LEN].to_string()
}

/// Key for a vector row: `"{content_hash}_{seq}"`.
pub fn vec_key(content_hash: &str, seq: u32) -> String {
    format!("{}_{}", content_hash, seq)
}

/// Split a vector key back into its content hash and sequence number.
pub fn split_vec_key(vec_key: &str) -> Option<(&str, u32)> {
    let (hash, seq) = vec_key.rsplit_once('_')?;
    let seq = seq.parse().ok()?;
    Some((hash, seq))
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_md5_hex() {
        // md5("") is a well-known constant
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_doc_id_is_stable_and_short() {
        let hash = content_hash("hello");
        let id1 = doc_id(&hash, "notes/a.md");
        let id2 = doc_id(&hash, "notes/a.md");
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), DOC_ID_LEN);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_doc_id_depends_on_path() {
        let hash = content_hash("same body");
        assert_ne!(doc_id(&hash, "a.md"), doc_id(&hash, "b.md"));
    }

    #[test]
    fn test_vec_key_round_trip() {
        let key = vec_key("abcd1234", 3);
        assert_eq!(key, "abcd1234_3");
        assert_eq!(split_vec_key(&key), Some(("abcd1234", 3)));
        assert_eq!(split_vec_key("nounderscore"), None);
    }
}
