//! Authenticated encryption for cached payloads.
//!
//! # Responsibilities
//! - Seal opaque payloads with ChaCha20-Poly1305 plus an independent
//!   HMAC-SHA256 integrity tag
//! - Verify the tag before any decryption is attempted
//! - Selectively encrypt named fields of a JSON record in place
//!
//! # Design Decisions
//! - The integrity key is derived separately from the cipher key; the AEAD
//!   tag alone is not the record's integrity contract
//! - Version and algorithm are checked before tag verification, and records
//!   from a different version are rejected outright (no silent downgrade)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::EncryptionConfig;
use crate::crypto::keys::KeyMaterial;
use crate::error::{EncryptionFailure, GatewayError, Result};
use crate::observability::metrics;
use crate::util::now_ms;

type HmacSha256 = Hmac<Sha256>;

/// Current record format version.
pub const FORMAT_VERSION: u32 = 1;

/// Identifier of the AEAD algorithm in use.
pub const ALGORITHM_ID: &str = "chacha20poly1305";

/// Marker prefix for selectively encrypted fields.
pub const ENC_FIELD_PREFIX: &str = "__enc__";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 32;
const AEAD_OVERHEAD: usize = 16;
const COMPACT_PREFIX: &str = "gw1";

/// An encrypted payload plus the metadata needed to verify and open it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Nonce followed by AEAD ciphertext.
    pub ciphertext: Vec<u8>,
    /// HMAC-SHA256 over the ciphertext, keyed independently of the cipher.
    pub integrity_tag: Vec<u8>,
    /// Algorithm that produced the ciphertext.
    pub algorithm_id: String,
    /// Record format version.
    pub format_version: u32,
    /// Creation timestamp, Unix milliseconds.
    pub created_at_ms: u64,
}

impl EncryptedRecord {
    /// Compact single-string encoding for embedding in field markers.
    pub fn to_compact(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            COMPACT_PREFIX,
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
            URL_SAFE_NO_PAD.encode(&self.integrity_tag),
            self.created_at_ms
        )
    }

    /// Parse the compact encoding produced by [`to_compact`].
    ///
    /// [`to_compact`]: EncryptedRecord::to_compact
    pub fn from_compact(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 || parts[0] != COMPACT_PREFIX {
            return Err(GatewayError::Encryption(EncryptionFailure::VersionMismatch));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;
        let integrity_tag = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;
        let created_at_ms = parts[3]
            .parse()
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;
        Ok(Self {
            ciphertext,
            integrity_tag,
            algorithm_id: ALGORITHM_ID.to_string(),
            format_version: FORMAT_VERSION,
            created_at_ms,
        })
    }
}

/// Inner envelope sealed by the AEAD.
#[derive(Serialize, Deserialize)]
struct Envelope {
    plaintext_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
    encrypted_at_ms: u64,
    format_version: u32,
}

/// Encrypts and decrypts cached payloads.
pub struct CacheEncryptor {
    cipher: ChaCha20Poly1305,
    keys: KeyMaterial,
    max_payload_bytes: usize,
}

impl CacheEncryptor {
    /// Create an encryptor from resolved key material.
    pub fn new(keys: KeyMaterial, max_payload_bytes: usize) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(keys.cipher_key()));
        Self {
            cipher,
            keys,
            max_payload_bytes,
        }
    }

    /// Create an encryptor from configuration, resolving keys from the
    /// configured sources.
    pub fn from_config(config: &EncryptionConfig) -> Result<Self> {
        let keys = KeyMaterial::load_or_create(config)?;
        Ok(Self::new(keys, config.max_payload_bytes))
    }

    /// Encrypt a payload with optional metadata.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        metadata: Option<Map<String, Value>>,
    ) -> Result<EncryptedRecord> {
        if plaintext.len() > self.max_payload_bytes {
            return Err(GatewayError::Encryption(EncryptionFailure::Oversize));
        }

        let envelope = Envelope {
            plaintext_b64: URL_SAFE_NO_PAD.encode(plaintext),
            metadata,
            encrypted_at_ms: now_ms(),
            format_version: FORMAT_VERSION,
        };
        let envelope_bytes = serde_json::to_vec(&envelope)
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, envelope_bytes.as_slice())
            .map_err(|_| GatewayError::Internal("AEAD seal failed".to_string()))?;

        let mut ciphertext = Vec::with_capacity(NONCE_LEN + sealed.len());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&sealed);

        let integrity_tag = self.compute_tag(&ciphertext);

        metrics::record_encrypt();
        Ok(EncryptedRecord {
            ciphertext,
            integrity_tag,
            algorithm_id: ALGORITHM_ID.to_string(),
            format_version: FORMAT_VERSION,
            created_at_ms: now_ms(),
        })
    }

    /// Verify and decrypt a record, returning plaintext and metadata.
    pub fn decrypt(&self, record: &EncryptedRecord) -> Result<(Vec<u8>, Option<Map<String, Value>>)> {
        // Reject foreign formats before looking at the bytes.
        if record.format_version != FORMAT_VERSION || record.algorithm_id != ALGORITHM_ID {
            metrics::record_decrypt_failure("version_mismatch");
            return Err(GatewayError::Encryption(EncryptionFailure::VersionMismatch));
        }

        // Integrity is checked before any cipher work, so a tampered record
        // never reaches the AEAD and cannot be used as a padding oracle.
        let expected = self.compute_tag(&record.ciphertext);
        if !bool::from(expected.ct_eq(&record.integrity_tag)) {
            metrics::record_decrypt_failure("integrity_fail");
            return Err(GatewayError::Encryption(EncryptionFailure::IntegrityFail));
        }

        if record.ciphertext.len() < NONCE_LEN + AEAD_OVERHEAD {
            metrics::record_decrypt_failure("decrypt_fail");
            return Err(GatewayError::Encryption(EncryptionFailure::DecryptFail));
        }
        let (nonce_bytes, sealed) = record.ciphertext.split_at(NONCE_LEN);
        let envelope_bytes = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| {
                metrics::record_decrypt_failure("decrypt_fail");
                GatewayError::Encryption(EncryptionFailure::DecryptFail)
            })?;

        let envelope: Envelope = serde_json::from_slice(&envelope_bytes)
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;
        let plaintext = URL_SAFE_NO_PAD
            .decode(&envelope.plaintext_b64)
            .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;

        Ok((plaintext, envelope.metadata))
    }

    /// Encrypt the named fields of a JSON record in place.
    ///
    /// Each selected field is re-serialized (nested objects included),
    /// encrypted, and stored under a marker key; all other fields pass
    /// through untouched.
    pub fn encrypt_fields(
        &self,
        record: &Map<String, Value>,
        fields: &std::collections::HashSet<String>,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::with_capacity(record.len());
        for (key, value) in record {
            if fields.contains(key) {
                let bytes = serde_json::to_vec(value)
                    .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;
                let sealed = self.encrypt(&bytes, None)?;
                out.insert(
                    format!("{ENC_FIELD_PREFIX}{key}"),
                    Value::String(sealed.to_compact()),
                );
            } else {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(out)
    }

    /// Decrypt every marker field produced by [`encrypt_fields`], restoring
    /// the original keys.
    ///
    /// [`encrypt_fields`]: CacheEncryptor::encrypt_fields
    pub fn decrypt_fields(&self, record: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::with_capacity(record.len());
        for (key, value) in record {
            match key.strip_prefix(ENC_FIELD_PREFIX) {
                Some(original) => {
                    let compact = value
                        .as_str()
                        .ok_or(GatewayError::Encryption(EncryptionFailure::Serialization))?;
                    let sealed = EncryptedRecord::from_compact(compact)?;
                    let (bytes, _) = self.decrypt(&sealed)?;
                    let restored: Value = serde_json::from_slice(&bytes)
                        .map_err(|_| GatewayError::Encryption(EncryptionFailure::Serialization))?;
                    out.insert(original.to_string(), restored);
                }
                None => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    /// Cheap structural check without attempting decryption.
    pub fn is_valid(&self, record: &EncryptedRecord) -> bool {
        record.format_version == FORMAT_VERSION
            && record.algorithm_id == ALGORITHM_ID
            && record.integrity_tag.len() == TAG_LEN
            && record.ciphertext.len() >= NONCE_LEN + AEAD_OVERHEAD
    }

    fn compute_tag(&self, ciphertext: &[u8]) -> Vec<u8> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.keys.mac_key())
            .expect("HMAC accepts any key length");
        mac.update(ciphertext);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn encryptor() -> CacheEncryptor {
        CacheEncryptor::new(KeyMaterial::from_master(&[42u8; 32]), 1024 * 1024)
    }

    #[test]
    fn test_round_trip() {
        let enc = encryptor();
        let mut metadata = Map::new();
        metadata.insert("origin".to_string(), Value::String("tool:search".into()));

        let record = enc.encrypt(b"secret-value", Some(metadata)).unwrap();
        let (plaintext, meta) = enc.decrypt(&record).unwrap();

        assert_eq!(plaintext, b"secret-value");
        assert_eq!(meta.unwrap()["origin"], "tool:search");
    }

    #[test]
    fn test_oversize_rejected() {
        let enc = CacheEncryptor::new(KeyMaterial::from_master(&[1u8; 32]), 16);
        let err = enc.encrypt(&[0u8; 17], None).unwrap_err();
        match err {
            GatewayError::Encryption(EncryptionFailure::Oversize) => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_corrupted_ciphertext_fails_integrity() {
        let enc = encryptor();
        let mut record = enc.encrypt(b"payload", None).unwrap();

        for i in 0..record.ciphertext.len() {
            let mut corrupted = record.clone();
            corrupted.ciphertext[i] ^= 0x01;
            match enc.decrypt(&corrupted) {
                Err(GatewayError::Encryption(EncryptionFailure::IntegrityFail)) => {}
                other => panic!("byte {i}: expected integrity_fail, got {other:?}"),
            }
        }

        // Corrupting the tag itself must also fail closed.
        record.integrity_tag[0] ^= 0x01;
        match enc.decrypt(&record) {
            Err(GatewayError::Encryption(EncryptionFailure::IntegrityFail)) => {}
            other => panic!("expected integrity_fail, got {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch_rejected_outright() {
        let enc = encryptor();
        let mut record = enc.encrypt(b"payload", None).unwrap();
        record.format_version = 2;
        match enc.decrypt(&record) {
            Err(GatewayError::Encryption(EncryptionFailure::VersionMismatch)) => {}
            other => panic!("expected version_mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_key_fails_before_cipher() {
        let enc_a = encryptor();
        let enc_b = CacheEncryptor::new(KeyMaterial::from_master(&[9u8; 32]), 1024);

        let record = enc_a.encrypt(b"payload", None).unwrap();
        // The MAC key differs too, so the tag check fails first.
        match enc_b.decrypt(&record) {
            Err(GatewayError::Encryption(EncryptionFailure::IntegrityFail)) => {}
            other => panic!("expected integrity_fail, got {other:?}"),
        }
    }

    #[test]
    fn test_field_level_round_trip() {
        let enc = encryptor();
        let record: Map<String, Value> = serde_json::from_str(
            r#"{
                "id": "r-1",
                "api_key": "sk-abcdef",
                "nested": {"password": "hunter2", "depth": 2},
                "public": 7
            }"#,
        )
        .unwrap();

        let fields: HashSet<String> = ["api_key", "nested"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let sealed = enc.encrypt_fields(&record, &fields).unwrap();
        assert!(!sealed.contains_key("api_key"));
        assert!(sealed.contains_key("__enc__api_key"));
        assert!(sealed.contains_key("__enc__nested"));
        assert_eq!(sealed["public"], 7);
        assert!(!sealed["__enc__api_key"].to_string().contains("sk-abcdef"));

        let restored = enc.decrypt_fields(&sealed).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_is_valid_structural_only() {
        let enc = encryptor();
        let mut record = enc.encrypt(b"x", None).unwrap();
        assert!(enc.is_valid(&record));

        record.integrity_tag.truncate(8);
        assert!(!enc.is_valid(&record));
    }

    #[test]
    fn test_compact_encoding_round_trip() {
        let enc = encryptor();
        let record = enc.encrypt(b"compact", None).unwrap();
        let parsed = EncryptedRecord::from_compact(&record.to_compact()).unwrap();
        let (plaintext, _) = enc.decrypt(&parsed).unwrap();
        assert_eq!(plaintext, b"compact");
    }
}
