//! AES-256-GCM payload encryption and keyed integrity hashing.
//!
//! This module authenticates and deciphers the envelopes exchanged with the
//! payment provider.
//!
//! # Security Properties
//!
//! - **Confidentiality**: AES-256-GCM under the merchant's per-mode key/IV
//! - **Integrity**: a keyed SHA-256 tag over the hex ciphertext, verified in
//!   constant time, plus the GCM authentication tag inside the ciphertext
//! - **Two-step verification**: [`CipherSuite::verify`] is a separate
//!   operation from [`CipherSuite::decrypt`], so forged or corrupted
//!   callbacks are rejected without ever feeding attacker-controlled bytes
//!   into the decryption routine

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::config::KeyMaterial;
use crate::envelope::{EncryptedEnvelope, PayloadMap};
use crate::{GatewayError, Result};

/// Size of the cipher key in bytes (256 bits).
const KEY_SIZE: usize = 32;

/// Size of the IV in bytes (96 bits for GCM).
const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// Cipher context for one provider environment.
///
/// Construct via [`CipherSuite::from_material`] with the key material for
/// the active [`crate::GatewayMode`].
///
/// # Example
///
/// ```
/// use gatekit_lib::config::KeyMaterial;
/// use gatekit_lib::crypto::CipherSuite;
/// use gatekit_lib::envelope::PayloadMap;
///
/// let material = KeyMaterial::new("11".repeat(32), "22".repeat(12), "hash-secret");
/// let suite = CipherSuite::from_material(&material)?;
///
/// let mut payload = PayloadMap::new();
/// payload.insert("status".into(), "1".into());
///
/// let envelope = suite.encrypt(&payload)?;
/// assert!(suite.verify(&envelope));
/// assert_eq!(suite.decrypt(&envelope.cipher_payload)?, payload);
/// # Ok::<(), gatekit_lib::GatewayError>(())
/// ```
#[derive(Clone)]
pub struct CipherSuite {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
    hash_key: Vec<u8>,
}

impl CipherSuite {
    /// Build a cipher context from hex-encoded key material.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Crypto` when the key or IV is not valid hex of
    /// the required length.
    pub fn from_material(material: &KeyMaterial) -> Result<Self> {
        let key_bytes = hex::decode(&material.key_hex)
            .map_err(|e| GatewayError::Crypto(format!("malformed cipher key hex: {e}")))?;
        let key: [u8; KEY_SIZE] = key_bytes
            .try_into()
            .map_err(|_| GatewayError::crypto("cipher key must be 32 bytes"))?;

        let iv_bytes = hex::decode(&material.iv_hex)
            .map_err(|e| GatewayError::Crypto(format!("malformed cipher IV hex: {e}")))?;
        let iv: [u8; IV_SIZE] = iv_bytes
            .try_into()
            .map_err(|_| GatewayError::crypto("cipher IV must be 12 bytes"))?;

        Ok(Self {
            key,
            iv,
            hash_key: material.hash_key.as_bytes().to_vec(),
        })
    }

    /// Encrypt a payload into an envelope.
    ///
    /// The payload is serialized deterministically (BTreeMap key order),
    /// encrypted, hex-encoded, and tagged with the keyed digest.
    pub fn encrypt(&self, payload: &PayloadMap) -> Result<EncryptedEnvelope> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| GatewayError::Crypto(format!("payload serialization failed: {e}")))?;

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| GatewayError::Crypto(format!("cipher init failed: {e}")))?;
        let nonce = Nonce::from_slice(&self.iv);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| GatewayError::crypto("encryption failed"))?;

        let cipher_payload = hex::encode(ciphertext);
        let integrity_tag = self.keyed_hash(&cipher_payload);

        Ok(EncryptedEnvelope::new(cipher_payload, integrity_tag))
    }

    /// Keyed digest of a hex ciphertext: SHA-256 over the hash key
    /// concatenated with the ciphertext, upper-case hex encoded.
    ///
    /// Pure function of its inputs.
    pub fn keyed_hash(&self, cipher_payload_hex: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.hash_key);
        hasher.update(cipher_payload_hex.as_bytes());
        hex::encode_upper(hasher.finalize())
    }

    /// Recompute the keyed digest and compare against the presented tag in
    /// constant time.
    ///
    /// Must return `true` before [`Self::decrypt`] is invoked on untrusted
    /// input.
    pub fn verify_integrity(&self, cipher_payload_hex: &str, tag_hex: &str) -> bool {
        let expected = self.keyed_hash(cipher_payload_hex);
        expected.as_bytes().ct_eq(tag_hex.as_bytes()).into()
    }

    /// Verify an envelope's integrity tag against its ciphertext.
    pub fn verify(&self, envelope: &EncryptedEnvelope) -> bool {
        self.verify_integrity(&envelope.cipher_payload, &envelope.integrity_tag)
    }

    /// Decrypt a hex ciphertext back into a payload.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Crypto` on malformed hex, ciphertext
    /// truncation, or GCM authentication failure. Never returns partial
    /// data.
    pub fn decrypt(&self, cipher_payload_hex: &str) -> Result<PayloadMap> {
        let ciphertext = hex::decode(cipher_payload_hex)
            .map_err(|e| GatewayError::Crypto(format!("malformed ciphertext hex: {e}")))?;

        if ciphertext.len() < TAG_SIZE {
            return Err(GatewayError::crypto(
                "ciphertext shorter than authentication tag",
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| GatewayError::Crypto(format!("cipher init failed: {e}")))?;
        let nonce = Nonce::from_slice(&self.iv);

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| GatewayError::crypto("ciphertext authentication failed"))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| GatewayError::Crypto(format!("decrypted payload is not a valid map: {e}")))
    }
}

impl Drop for CipherSuite {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
        self.hash_key.zeroize();
    }
}
