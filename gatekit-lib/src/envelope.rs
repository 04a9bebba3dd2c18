//! The encrypted envelope exchanged with the payment provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat key/value payload carried inside an envelope.
///
/// A `BTreeMap` keeps serialization deterministic: the same payload always
/// produces the same plaintext bytes, so ciphertexts are reproducible under
/// a fixed key and IV.
pub type PayloadMap = BTreeMap<String, Value>;

/// The paired (ciphertext, integrity tag) unit exchanged with the provider.
///
/// The tag must be verified against the ciphertext before decryption is
/// attempted; see [`crate::crypto::CipherSuite::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Hex-encoded AES-256-GCM ciphertext
    pub cipher_payload: String,
    /// Upper-case hex keyed SHA-256 digest of `cipher_payload`
    pub integrity_tag: String,
}

impl EncryptedEnvelope {
    pub fn new(cipher_payload: impl Into<String>, integrity_tag: impl Into<String>) -> Self {
        Self {
            cipher_payload: cipher_payload.into(),
            integrity_tag: integrity_tag.into(),
        }
    }
}

/// Read a payload field as text, accepting the scalar encodings providers
/// actually send (strings, numbers, booleans).
pub fn payload_text(payload: &PayloadMap, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serialization_round_trip() {
        let envelope = EncryptedEnvelope::new("deadbeef", "ABCDEF0123");
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: EncryptedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, parsed);
    }

    #[test]
    fn test_payload_text_scalars() {
        let mut payload = PayloadMap::new();
        payload.insert("status".to_string(), json!("1"));
        payload.insert("amount".to_string(), json!(100));
        payload.insert("retried".to_string(), json!(false));
        payload.insert("items".to_string(), json!(["a", "b"]));

        assert_eq!(payload_text(&payload, "status").as_deref(), Some("1"));
        assert_eq!(payload_text(&payload, "amount").as_deref(), Some("100"));
        assert_eq!(payload_text(&payload, "retried").as_deref(), Some("false"));
        assert_eq!(payload_text(&payload, "items"), None);
        assert_eq!(payload_text(&payload, "missing"), None);
    }

    #[test]
    fn test_payload_serialization_is_deterministic() {
        let mut a = PayloadMap::new();
        a.insert("z".to_string(), json!("last"));
        a.insert("a".to_string(), json!("first"));

        let mut b = PayloadMap::new();
        b.insert("a".to_string(), json!("first"));
        b.insert("z".to_string(), json!("last"));

        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}
