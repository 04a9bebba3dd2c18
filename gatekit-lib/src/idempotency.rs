//! Idempotency tokens for outbound provider calls.
//!
//! The provider treats these as retry-deduplication keys: a resubmitted
//! request carrying the same key is not charged twice. Keys are generated
//! fresh per call attempt and never persisted here.

use rand::Rng;

/// Total length of a generated key.
const KEY_LENGTH: usize = 20;

/// Maximum number of caller-supplied prefix characters kept.
const MAX_PREFIX_LENGTH: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random upper-case alphanumeric string of the given length.
pub(crate) fn random_alnum_upper(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Generate a 20-character upper-case alphanumeric idempotency key.
///
/// A non-empty `prefix` is truncated to 8 characters and used as a literal
/// leading substring; the remainder is random.
///
/// # Example
///
/// ```
/// use gatekit_lib::idempotency::generate_key;
///
/// let key = generate_key("RENEW");
/// assert!(key.starts_with("RENEW"));
/// assert_eq!(key.len(), 20);
/// ```
pub fn generate_key(prefix: &str) -> String {
    let mut key: String = prefix.chars().take(MAX_PREFIX_LENGTH).collect();
    key.push_str(&random_alnum_upper(KEY_LENGTH - key.chars().count()));
    key
}

/// Generate a version-4 UUID in canonical lower-case hyphenated form.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
