//! Storage-key conventions shared by negotiation and polling.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Leading path segment the write side stores raw payloads under.
pub const RAW_KEY_SEGMENT: &str = "uploads/";

/// Leading path segment the transform backend publishes results under.
pub const PROCESSED_KEY_SEGMENT: &str = "processed/";

/// Scope used in suggested keys when no identity is signed in.
pub const ANONYMOUS_KEY_SCOPE: &str = "temp";

/// Source of unique tokens for suggested storage keys.
pub trait KeyGenerator: Send + Sync {
    /// Produce the next token. Tokens must be unique per generator and safe
    /// to embed in a URL path segment.
    fn next_token(&self) -> String;
}

/// Generator backed by random UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn next_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Monotonic counter generator, for embedders that want ordered keys.
#[derive(Debug, Default)]
pub struct SequentialKeyGenerator {
    next: AtomicU64,
}

impl KeyGenerator for SequentialKeyGenerator {
    fn next_token(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

/// Compose the key suggested to the control endpoint for a new run.
///
/// The suggestion scopes the object under the signed-in identity, or under
/// [`ANONYMOUS_KEY_SCOPE`] otherwise, and keeps the candidate's extension so
/// the stored object stays recognisable. The control endpoint may ignore the
/// suggestion entirely; the key it returns is authoritative.
#[must_use]
pub fn suggested_key(
    identity_id: Option<&str>,
    filename: &str,
    generator: &dyn KeyGenerator,
) -> String {
    let scope = identity_id.unwrap_or(ANONYMOUS_KEY_SCOPE);
    let extension = filename.rsplit('.').next().unwrap_or("bin");
    let token = generator.next_token();
    format!("users/{scope}/{token}.{extension}")
}

/// Derive the read-side key for a processed artifact from the raw object key.
///
/// Only the first occurrence of the raw segment is substituted. Keys without
/// a raw segment come back unchanged, which callers treat as "probe the
/// original location".
#[must_use]
pub fn derive_processed_key(object_key: &str) -> String {
    object_key.replacen(RAW_KEY_SEGMENT, PROCESSED_KEY_SEGMENT, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_substitutes_the_first_raw_segment_only() {
        assert_eq!(
            derive_processed_key("uploads/users/u1/a.jpg"),
            "processed/users/u1/a.jpg"
        );
        assert_eq!(
            derive_processed_key("uploads/nested/uploads/b.png"),
            "processed/nested/uploads/b.png"
        );
    }

    #[test]
    fn derivation_leaves_keys_without_raw_segment_alone() {
        assert_eq!(derive_processed_key("users/temp/c.webp"), "users/temp/c.webp");
        assert_eq!(derive_processed_key(""), "");
    }

    #[test]
    fn suggestion_scopes_by_identity() {
        let generator = SequentialKeyGenerator::default();
        assert_eq!(
            suggested_key(Some("user-9"), "photo.jpg", &generator),
            "users/user-9/0.jpg"
        );
        assert_eq!(
            suggested_key(None, "photo.jpg", &generator),
            "users/temp/1.jpg"
        );
    }

    #[test]
    fn suggestion_keeps_the_last_extension() {
        let generator = SequentialKeyGenerator::default();
        assert_eq!(
            suggested_key(None, "archive.tar.gz", &generator),
            "users/temp/0.gz"
        );
        // No dot at all: the whole name doubles as the extension.
        assert_eq!(suggested_key(None, "photo", &generator), "users/temp/1.photo");
    }

    #[test]
    fn uuid_tokens_are_unique_and_path_safe() {
        let generator = UuidKeyGenerator;
        let a = generator.next_token();
        let b = generator.next_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
