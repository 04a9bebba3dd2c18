//! Merchant trade reference codec.
//!
//! A trade reference is the opaque provider-facing identifier correlating a
//! request or callback with an internal transaction. Three encodings are in
//! flight in historical data and all must remain decodable:
//!
//! 1. Tagged format `{ref}__{time}_{rand}` - the current format, correlated
//!    by an opaque UUID-like reference.
//! 2. ID format `{id}A{base36(time)}{rand}` - correlated by a numeric
//!    internal ID, recoverable via [`parse_numeric_prefix`].
//! 3. Opaque legacy references with neither shape.
//!
//! [`extract_reference`] is deliberately format-preserving rather than
//! "smart": with no `__` delimiter present there is no reliable separator,
//! so the input is returned unchanged and callers that know they are
//! looking at an ID-style reference apply [`parse_numeric_prefix`]
//! themselves.

use rand::Rng;

use crate::idempotency::random_alnum_upper;

/// Separator between the numeric ID and the time component in ID format.
const ID_SEPARATOR: char = 'A';

/// Delimiter between the reference and the uniqueness suffix in tagged
/// format.
const TAG_DELIMITER: &str = "__";

/// Length of the random suffix appended to generated references.
const SUFFIX_LENGTH: usize = 2;

/// Generate an ID-format trade reference embedding a numeric internal ID.
///
/// Produces `{id}A{base36(unix_time)}{2-char random suffix}`, at most 20
/// characters for IDs up to 11 digits. The ID is recoverable with
/// [`parse_numeric_prefix`].
///
/// An `internal_id` below 1 has nothing to embed; the fallback is an opaque
/// `T`-prefixed reference that no numeric parse will match.
pub fn generate(internal_id: i64) -> String {
    if internal_id < 1 {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let sanitized: String = uuid.chars().filter(char::is_ascii_alphanumeric).take(12).collect();
        return format!("T{sanitized}");
    }

    let now = chrono::Utc::now().timestamp();
    format!(
        "{internal_id}{ID_SEPARATOR}{}{}",
        base36(now.max(0) as u64),
        random_alnum_upper(SUFFIX_LENGTH)
    )
}

/// Generate a tagged-format trade reference for an opaque UUID-like
/// reference: `{reference}__{unix_time}_{random suffix}`.
pub fn generate_with_tag(reference: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut rng = rand::thread_rng();
    format!(
        "{reference}{TAG_DELIMITER}{now}_{}",
        rng.gen_range(10..100)
    )
}

/// Recover the internal reference from a trade reference in any supported
/// encoding.
///
/// Splits on the first `__` and returns the left-hand side verbatim (which
/// may itself contain single underscores). With no delimiter present the
/// whole input is returned unchanged; ID-style callers follow up with
/// [`parse_numeric_prefix`]. Total: never errors.
pub fn extract_reference(trade_ref: &str) -> String {
    match trade_ref.split_once(TAG_DELIMITER) {
        Some((reference, _)) => reference.to_string(),
        None => trade_ref.to_string(),
    }
}

/// The secondary parse for ID-format references: the leading decimal digits
/// of `{id}A...`, or `None` when the input does not start with `digits 'A'`.
pub fn parse_numeric_prefix(trade_ref: &str) -> Option<i64> {
    let digits: String = trade_ref.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = &trade_ref[digits.len()..];
    if !rest.starts_with(ID_SEPARATOR) {
        return None;
    }
    digits.parse().ok()
}

/// Encode a value in lower-case base36.
fn base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.into_iter().rev().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_embeds_recoverable_id() {
        let reference = generate(42);
        assert!(reference.starts_with("42A"));
        assert_eq!(parse_numeric_prefix(&reference), Some(42));
    }

    #[test]
    fn test_generate_length_bound() {
        // 11-digit ID: the largest realistic magnitude
        let reference = generate(99_999_999_999);
        assert!(reference.len() <= 20, "too long: {reference}");
    }

    #[test]
    fn test_generate_fallback_for_non_positive_id() {
        for id in [0, -1] {
            let reference = generate(id);
            assert!(reference.starts_with('T'));
            assert!(reference.len() <= 20);
            assert_eq!(parse_numeric_prefix(&reference), None);
        }
    }

    #[test]
    fn test_generated_references_are_distinct() {
        let a = generate(7);
        let b = generate(7);
        // Same second, different random suffix (collision odds 1/1296)
        let c = generate_with_tag("order-7");
        let d = generate_with_tag("order-7");
        assert!(a != b || c != d);
    }

    #[test]
    fn test_tagged_round_trip() {
        let reference = generate_with_tag("3fa85f64-5717-4562");
        assert_eq!(extract_reference(&reference), "3fa85f64-5717-4562");
    }

    #[test]
    fn test_tagged_round_trip_with_single_underscores() {
        let reference = generate_with_tag("wc_order_abc123");
        assert_eq!(extract_reference(&reference), "wc_order_abc123");
    }

    #[test]
    fn test_extract_splits_on_first_delimiter() {
        assert_eq!(extract_reference("abc__123__456"), "abc");
    }

    #[test]
    fn test_extract_without_delimiter_is_identity() {
        assert_eq!(extract_reference("no-delimiter"), "no-delimiter");
        assert_eq!(extract_reference("42A1bc2de3XY"), "42A1bc2de3XY");
        assert_eq!(extract_reference("a_b_c"), "a_b_c");
    }

    #[test]
    fn test_extract_edge_cases() {
        assert_eq!(extract_reference(""), "");
        assert_eq!(extract_reference("__"), "");
        assert_eq!(extract_reference("__tail"), "");
    }

    #[test]
    fn test_parse_numeric_prefix() {
        assert_eq!(parse_numeric_prefix("42A1bc2de3XY"), Some(42));
        assert_eq!(parse_numeric_prefix("7Ax"), Some(7));
        assert_eq!(parse_numeric_prefix("42B1bc2"), None);
        assert_eq!(parse_numeric_prefix("A1bc2"), None);
        assert_eq!(parse_numeric_prefix("42"), None);
        assert_eq!(parse_numeric_prefix(""), None);
        assert_eq!(parse_numeric_prefix("Tdeadbeef1234"), None);
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1_700_000_000), "s44we8"); // 6 chars at current epochs
    }
}
