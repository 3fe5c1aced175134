//! Cryptography subsystem.
//!
//! # Responsibilities
//! - Resolve and derive key material (passphrase, key file, or generated)
//! - Authenticated encryption of cached payloads
//! - Field-level selective encryption for structured records

pub mod encryptor;
pub mod keys;

pub use encryptor::{CacheEncryptor, EncryptedRecord, ALGORITHM_ID, FORMAT_VERSION};
pub use keys::KeyMaterial;
